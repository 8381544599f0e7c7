//! Tunnel client kinds
//!
//! Different client applications understand different WireGuard extensions.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Client application consuming tunnel documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// Stock Xray-core clients
    #[default]
    Xray,
    /// NikaNG, which understands WireGuard noise parameters
    Nikang,
}

impl ClientKind {
    /// Get client name
    pub fn name(&self) -> &'static str {
        match self {
            ClientKind::Xray => "xray",
            ClientKind::Nikang => "nikang",
        }
    }

    /// Whether the primary tunnel outbound carries noise parameters
    pub fn supports_noise(&self) -> bool {
        matches!(self, ClientKind::Nikang)
    }

    /// Parse client from name string
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse()
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ClientKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "xray" | "v2rayng" => Ok(ClientKind::Xray),
            "nikang" | "nikang-pro" | "pro" => Ok(ClientKind::Nikang),
            _ => Err(Error::invalid("client", format!("Unknown client: {s}"))),
        }
    }
}
