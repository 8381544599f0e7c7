//! Config command - settings file management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;
use xsynth_core::ProxySettings;

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective settings
    Show {
        /// Settings file to show (default: detect)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write a settings file with default values
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "xsynth.toml")]
        output: PathBuf,
    },

    /// Validate a settings file
    Validate {
        /// Settings file to validate
        file: PathBuf,
    },

    /// Show settings file locations
    Paths,
}

/// Execute config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show { file } => show_settings(file),
        ConfigAction::Generate { output } => generate_settings(output),
        ConfigAction::Validate { file } => validate_settings(file),
        ConfigAction::Paths => show_paths(),
    }
}

fn show_settings(file: Option<PathBuf>) -> Result<()> {
    let settings = match file.or_else(find_settings_file) {
        Some(path) => ProxySettings::load(&path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => ProxySettings::default(),
    };

    let toml_str = settings.to_toml().context("Failed to serialize settings")?;
    println!("{}", toml_str);
    Ok(())
}

fn generate_settings(output: PathBuf) -> Result<()> {
    let toml_str = ProxySettings::default()
        .to_toml()
        .context("Failed to serialize settings")?;

    let content = format!(
        "# xsynth settings\n\
         # Every key is optional; missing keys take the values below\n\n\
         {}",
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("Failed to write settings to {:?}", output))?;

    info!("Generated settings file: {:?}", output);
    println!("Settings file generated: {}", output.display());

    Ok(())
}

fn validate_settings(file: PathBuf) -> Result<()> {
    let settings = ProxySettings::load(&file)
        .with_context(|| format!("Failed to load settings from {:?}", file))?;

    settings.validate().context("Settings validation failed")?;

    let protocols: Vec<&str> = [
        (settings.protocols.vless, "vless"),
        (settings.protocols.trojan, "trojan"),
    ]
    .into_iter()
    .filter_map(|(enabled, name)| enabled.then_some(name))
    .collect();

    println!("{}", "✓ Settings are valid".green());
    println!("  Remote DNS: {}", settings.dns.remote_dns);
    println!("  Protocols: {}", protocols.join(", "));
    println!("  Ports: {:?}", settings.addresses.ports);
    println!("  Chain proxy: {}", settings.chain.params.is_some());
    println!("  Tunnel endpoints: {}", settings.warp.endpoints.len());

    Ok(())
}

fn show_paths() -> Result<()> {
    println!("Settings file search paths:");
    println!();
    for (index, path) in search_paths().iter().enumerate() {
        println!("  {}. {}", index + 1, path.display());
    }
    Ok(())
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("xsynth.toml"), PathBuf::from("xsynth.json")];

    if let Some(dirs) = directories::ProjectDirs::from("", "", "xsynth") {
        paths.push(dirs.config_dir().join("settings.toml"));
        paths.push(dirs.config_dir().join("settings.json"));
    }

    paths
}

/// First existing settings file on the search path
pub fn find_settings_file() -> Option<PathBuf> {
    search_paths().into_iter().find(|path| path.exists())
}
