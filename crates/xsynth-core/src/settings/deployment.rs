//! Per-deployment identity
//!
//! Values that identify the worker serving the tunnels. They are threaded
//! explicitly through every targeted synthesis call.

use crate::address::is_domain;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ports on which tunneled streams are TLS-secured
pub const DEFAULT_HTTPS_PORTS: [u16; 6] = [443, 8443, 2053, 2083, 2087, 2096];

/// Deployment identity and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Public host name of the deployment
    pub host_name: String,
    /// VLESS user id (UUID v4)
    pub user_id: String,
    /// Trojan password
    pub trojan_password: String,
    /// Ports served over TLS
    #[serde(default = "default_https_ports")]
    pub https_ports: Vec<u16>,
}

fn default_https_ports() -> Vec<u16> {
    DEFAULT_HTTPS_PORTS.to_vec()
}

impl Deployment {
    /// Deployment with the default HTTPS port set
    pub fn new(
        host_name: impl Into<String>,
        user_id: impl Into<String>,
        trojan_password: impl Into<String>,
    ) -> Self {
        Self {
            host_name: host_name.into(),
            user_id: user_id.into(),
            trojan_password: trojan_password.into(),
            https_ports: default_https_ports(),
        }
    }

    /// Whether `port` is served over TLS
    pub fn is_https_port(&self, port: u16) -> bool {
        self.https_ports.contains(&port)
    }

    /// Validate the deployment identity
    pub fn validate(&self) -> Result<()> {
        if !is_domain(&self.host_name) {
            return Err(Error::invalid(
                "deployment.host_name",
                format!("'{}' is not a domain name", self.host_name),
            ));
        }

        let id = Uuid::parse_str(&self.user_id)
            .map_err(|e| Error::invalid("deployment.user_id", e.to_string()))?;
        if id.get_version_num() != 4 {
            return Err(Error::invalid("deployment.user_id", "must be a version 4 UUID"));
        }

        if self.trojan_password.is_empty() {
            return Err(Error::invalid("deployment.trojan_password", "must not be empty"));
        }
        if self.https_ports.is_empty() {
            return Err(Error::invalid("deployment.https_ports", "at least one port is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_ID: &str = "89b3cbba-e6ac-485a-9481-976a0415eab9";

    #[test]
    fn test_valid_deployment() {
        let deployment = Deployment::new("worker.example.dev", USER_ID, "secret");
        assert!(deployment.validate().is_ok());
        assert!(deployment.is_https_port(2096));
        assert!(!deployment.is_https_port(80));
    }

    #[test]
    fn test_invalid_host() {
        let deployment = Deployment::new("localhost", USER_ID, "secret");
        assert!(deployment.validate().is_err());
    }

    #[test]
    fn test_invalid_user_id() {
        let deployment = Deployment::new("worker.example.dev", "not-a-uuid", "secret");
        assert!(deployment.validate().is_err());

        // version 1
        let deployment = Deployment::new(
            "worker.example.dev",
            "c232ab00-9414-11ec-b3c8-9f6bdeced846",
            "secret",
        );
        assert!(deployment.validate().is_err());
    }

    #[test]
    fn test_empty_password() {
        let deployment = Deployment::new("worker.example.dev", USER_ID, "");
        assert!(deployment.validate().is_err());
    }

    #[test]
    fn test_deserialize_default_ports() {
        let json = format!(
            r#"{{"host_name":"worker.example.dev","user_id":"{USER_ID}","trojan_password":"pw"}}"#
        );
        let deployment: Deployment = serde_json::from_str(&json).unwrap();
        assert_eq!(deployment.https_ports, DEFAULT_HTTPS_PORTS.to_vec());
    }
}
