//! xsynth CLI
//!
//! Command-line interface for the configuration synthesizer.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    logging::init(&args)?;

    let result = run(args).await;

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        commands::Command::Generate(generate_args) => commands::generate::execute(generate_args).await,
        commands::Command::Warp(warp_args) => commands::warp::execute(warp_args).await,
        commands::Command::Config(config_args) => commands::config::execute(config_args),
        commands::Command::Completions(comp_args) => commands::completions::execute(comp_args),
    }
}
