//! Settings persistence collaborator

use super::{is_json_path, ProxySettings};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Correction written back to the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsPatch {
    /// Drop a chain-proxy descriptor that failed to parse
    ClearChainProxy,
}

/// Source of truth for [`ProxySettings`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings snapshot
    async fn load(&self) -> Result<ProxySettings>;

    /// Persist a correction
    async fn save(&self, patch: SettingsPatch) -> Result<()>;
}

/// Store backed by a TOML or JSON file
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Store for the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, settings: &ProxySettings) -> Result<String> {
        if is_json_path(&self.path) {
            serde_json::to_string_pretty(settings).map_err(Error::from)
        } else {
            settings.to_toml()
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<ProxySettings> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Store(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), "Loaded settings");
        if is_json_path(&self.path) {
            ProxySettings::from_json(&content)
        } else {
            ProxySettings::from_toml(&content)
        }
    }

    async fn save(&self, patch: SettingsPatch) -> Result<()> {
        let mut settings = self.load().await?;
        settings.apply(&patch);
        let content = self.encode(&settings)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| Error::Store(format!("{}: {e}", self.path.display())))?;
        info!(path = %self.path.display(), ?patch, "Persisted settings correction");
        Ok(())
    }
}
