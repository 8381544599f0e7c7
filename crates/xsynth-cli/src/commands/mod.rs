//! CLI commands

pub mod completions;
pub mod config;
pub mod generate;
pub mod warp;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};
use tracing::info;
use xsynth_core::ConfigDocument;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate per-destination, best-ping and fragment documents
    Generate(generate::GenerateArgs),

    /// Generate WireGuard tunnel documents
    Warp(warp::WarpArgs),

    /// Settings file management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Encode documents as a 4-space indented JSON array
pub fn encode_documents(documents: &[ConfigDocument]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    documents
        .serialize(&mut serializer)
        .context("Failed to serialize documents")?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// Write documents to `output`, or stdout when absent
pub fn write_documents(documents: &[ConfigDocument], output: Option<&Path>) -> Result<()> {
    let encoded = encode_documents(documents)?;
    match output {
        Some(path) => {
            std::fs::write(path, &encoded)
                .with_context(|| format!("Failed to write documents to {:?}", path))?;
            info!(count = documents.len(), path = %path.display(), "Wrote documents");
        }
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&encoded).context("Failed to write documents")?;
        }
    }
    Ok(())
}

/// Settings file from `explicit`, or the first existing search path
pub fn settings_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    config::find_settings_file().context(
        "No settings file found; pass --settings or create one with `xsynth config generate`",
    )
}
