//! Warp command - WireGuard tunnel document set

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use xsynth_core::resolver::DEFAULT_DOH_URL;
use xsynth_core::{ClientKind, DohResolver, FileSettingsStore, Synthesizer, TunnelCredentials};

/// Warp command arguments
#[derive(Args, Debug)]
pub struct WarpArgs {
    /// Tunnel account file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub credentials: PathBuf,

    /// Target client (xray, nikang)
    #[arg(long, default_value = "xray")]
    pub client: ClientKind,

    /// Settings file (default: detect)
    #[arg(short, long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// DNS-over-HTTPS endpoint for static lookups
    #[arg(long, value_name = "URL", default_value = DEFAULT_DOH_URL)]
    pub doh: String,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Execute the warp command
pub async fn execute(args: WarpArgs) -> Result<()> {
    let credentials = TunnelCredentials::load(&args.credentials)
        .with_context(|| format!("Failed to load credentials from {:?}", args.credentials))?;
    let path = super::settings_path(args.settings)?;

    let resolver = DohResolver::with_endpoint(&args.doh).context("Failed to create resolver")?;
    let synth = Synthesizer::new(resolver, FileSettingsStore::new(&path));
    let settings = synth
        .load_settings()
        .await
        .with_context(|| format!("Failed to load settings from {:?}", path))?;

    let documents = synth
        .tunnel_configs(&settings, &credentials, args.client)
        .await
        .context("Failed to generate tunnel documents")?;

    info!(count = documents.len(), client = %args.client, "Generated tunnel documents");

    super::write_documents(&documents, args.output.as_deref())
}
