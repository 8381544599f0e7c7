//! Command-line argument parsing

use clap::{Parser, ValueEnum};
use crate::commands::Command;

/// xsynth - proxy client configuration synthesizer
///
/// Builds ready-to-import client documents from one settings file: one
/// document per destination, latency-balanced aggregates, a fragmentation
/// ladder and WireGuard tunnel variants.
#[derive(Parser, Debug)]
#[command(name = "xsynth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format for logs
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Log file path
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// Compact format
    Compact,
}
