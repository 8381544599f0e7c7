//! # xsynth Core
//!
//! Configuration synthesis for stream-proxy client engines.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Settings** - Typed, validated user preferences and deployment identity
//! - **Address pool** - Destination expansion with optional static resolution
//! - **DNS and routing** - Ordered resolver lists and rule sets per variant
//! - **Outbounds** - Tunneled streams, chain proxies and WireGuard tunnels
//! - **Variant generation** - Per-target, best-latency and fragmentation documents
//!
//! ## Example
//!
//! ```rust,no_run
//! use xsynth_core::{Deployment, DohResolver, FileSettingsStore, Synthesizer};
//!
//! # async fn run() -> xsynth_core::Result<()> {
//! let synth = Synthesizer::new(DohResolver::new()?, FileSettingsStore::new("settings.toml"));
//! let settings = synth.load_settings().await?;
//! let deployment = Deployment::new("worker.example.dev", "89b3cbba-e6ac-485a-9481-976a0415eab9", "secret");
//!
//! let documents = synth.targeted_configs(&deployment, &settings, false).await?;
//! println!("{}", serde_json::to_string_pretty(&documents)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod address;
pub mod chain;
pub mod dns;
pub mod document;
pub mod error;
pub mod fragment;
pub mod outbound;
pub mod remark;
pub mod resolver;
pub mod routing;
pub mod settings;
pub mod synth;

// Re-exports for convenience
pub use chain::ChainDescriptor;
pub use document::{ConfigDocument, VariantFlags};
pub use error::{Error, Result};
pub use outbound::Outbound;
pub use resolver::{DohResolver, ResolvedAddrs, Resolver};
pub use settings::{
    ClientKind, Deployment, FileSettingsStore, ProxySettings, SettingsPatch, SettingsStore,
    TunnelCredentials,
};
pub use synth::Synthesizer;
