//! Diagnostics for the `xsynth` binary
//!
//! Generated documents own stdout. Log lines go to stderr and, with
//! `--log-file`, are mirrored without ANSI colours into that file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, LogFormat};

/// Default level for the `-q` / `-v` flags; `RUST_LOG` still overrides it
fn level(args: &Args) -> Level {
    if args.quiet {
        return Level::ERROR;
    }
    match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn open_log_file(path: &str) -> Result<Mutex<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create log file: {path}"))?;
    Ok(Mutex::new(file))
}

/// Install the global subscriber
pub fn init(args: &Args) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level(args).into())
        .from_env_lossy();
    let log_file = args.log_file.as_deref().map(open_log_file).transpose()?;
    let detailed = args.verbose >= 3;

    match args.log_format {
        LogFormat::Text => {
            let stderr = fmt::layer()
                .with_writer(io::stderr)
                .with_target(args.verbose >= 2)
                .with_thread_ids(detailed)
                .with_file(detailed)
                .with_line_number(detailed);
            let mirror = log_file.map(|file| fmt::layer().with_ansi(false).with_writer(file));
            tracing_subscriber::registry().with(filter).with(stderr).with(mirror).init();
        }
        LogFormat::Json => {
            let stderr = fmt::layer().json().with_writer(io::stderr);
            let mirror = log_file.map(|file| fmt::layer().json().with_writer(file));
            tracing_subscriber::registry().with(filter).with(stderr).with(mirror).init();
        }
        LogFormat::Compact => {
            let stderr = fmt::layer().compact().with_writer(io::stderr);
            let mirror = log_file.map(|file| fmt::layer().compact().with_ansi(false).with_writer(file));
            tracing_subscriber::registry().with(filter).with(stderr).with(mirror).init();
        }
    }

    Ok(())
}
