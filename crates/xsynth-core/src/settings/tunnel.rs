//! WireGuard account material

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One registered WireGuard account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpAccount {
    /// IPv6 address assigned to the interface
    pub ipv6: String,
    /// Base64 of the three reserved bytes
    pub reserved: String,
    /// Peer public key
    pub public_key: String,
    /// Interface private key
    pub private_key: String,
}

impl WarpAccount {
    /// Decode the reserved field into its byte triplet
    pub fn reserved_bytes(&self) -> Result<[u8; 3]> {
        let bytes = STANDARD
            .decode(self.reserved.trim())
            .map_err(|e| Error::invalid("tunnel.reserved", e.to_string()))?;
        <[u8; 3]>::try_from(bytes.as_slice()).map_err(|_| {
            Error::invalid(
                "tunnel.reserved",
                format!("expected 3 bytes, got {}", bytes.len()),
            )
        })
    }

    fn validate(&self, key: &str) -> Result<()> {
        self.reserved_bytes()
            .map_err(|e| Error::invalid(format!("{key}.reserved"), e.to_string()))?;
        if self.public_key.is_empty() || self.private_key.is_empty() {
            return Err(Error::invalid(key, "public and private keys are required"));
        }
        if self.ipv6.is_empty() {
            return Err(Error::invalid(format!("{key}.ipv6"), "must not be empty"));
        }
        Ok(())
    }
}

/// Accounts for the direct tunnel and the tunnel-in-tunnel chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelCredentials {
    /// Account dialed directly
    pub primary: WarpAccount,
    /// Account dialed through the primary tunnel
    pub chained: WarpAccount,
}

impl TunnelCredentials {
    /// Load credentials from a TOML or JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            toml::from_str(&content).map_err(Error::from)
        }
    }

    /// Validate both accounts
    pub fn validate(&self) -> Result<()> {
        self.primary.validate("tunnel.primary")?;
        self.chained.validate("tunnel.chained")
    }
}
