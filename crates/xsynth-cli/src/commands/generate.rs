//! Generate command - targeted document set

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use xsynth_core::resolver::DEFAULT_DOH_URL;
use xsynth_core::{Deployment, DohResolver, FileSettingsStore, Synthesizer};

/// Deployment identity, from flags or environment
#[derive(Args, Debug, Clone)]
pub struct DeploymentArgs {
    /// Deployment host name
    #[arg(long, env = "XSYNTH_HOST")]
    pub host: String,

    /// VLESS user id (UUID v4)
    #[arg(long, env = "XSYNTH_USER_ID")]
    pub user_id: String,

    /// Trojan password
    #[arg(long, env = "XSYNTH_TROJAN_PASSWORD", hide_env_values = true)]
    pub trojan_password: String,

    /// Ports served over TLS (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub https_ports: Option<Vec<u16>>,
}

impl DeploymentArgs {
    /// Build and validate the deployment
    pub fn deployment(&self) -> Result<Deployment> {
        let mut deployment = Deployment::new(&self.host, &self.user_id, &self.trojan_password);
        if let Some(ref ports) = self.https_ports {
            deployment.https_ports = ports.clone();
        }
        deployment.validate().context("Invalid deployment")?;
        Ok(deployment)
    }
}

/// Generate command arguments
#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Settings file (default: detect)
    #[arg(short, long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Emit the fragmented variant set
    #[arg(short, long)]
    pub fragment: bool,

    /// DNS-over-HTTPS endpoint for static lookups
    #[arg(long, value_name = "URL", default_value = DEFAULT_DOH_URL)]
    pub doh: String,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Execute the generate command
pub async fn execute(args: GenerateArgs) -> Result<()> {
    let deployment = args.deployment.deployment()?;
    let path = super::settings_path(args.settings)?;

    let resolver = DohResolver::with_endpoint(&args.doh).context("Failed to create resolver")?;
    let synth = Synthesizer::new(resolver, FileSettingsStore::new(&path));
    let settings = synth
        .load_settings()
        .await
        .with_context(|| format!("Failed to load settings from {:?}", path))?;

    let documents = synth
        .targeted_configs(&deployment, &settings, args.fragment)
        .await
        .context("Failed to generate documents")?;

    info!(
        count = documents.len(),
        host = %deployment.host_name,
        fragment = args.fragment,
        "Generated documents"
    );

    super::write_documents(&documents, args.output.as_deref())
}
