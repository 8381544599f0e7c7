//! Upstream chain-proxy descriptors
//!
//! The chain proxy is stored as a serialized JSON object. Parsing is strict:
//! an unknown protocol, transport or security yields
//! [`Error::ChainDescriptor`], which the orchestrator absorbs.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// Parsed upstream proxy description
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ChainDescriptor {
    /// SOCKS5 upstream
    Socks(CredentialedUpstream),
    /// HTTP CONNECT upstream
    Http(CredentialedUpstream),
    /// VLESS upstream
    Vless(VlessUpstream),
}

/// SOCKS or HTTP upstream with optional credentials
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialedUpstream {
    /// Upstream host
    pub server: String,
    /// Upstream port
    #[serde(deserialize_with = "port_value")]
    pub port: u16,
    /// User name
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub pass: Option<String>,
}

/// Stream transport of a VLESS upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Raw TCP
    Tcp,
    /// WebSocket
    Ws,
    /// gRPC
    Grpc,
}

/// Stream security layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Plaintext
    #[default]
    None,
    /// TLS
    Tls,
    /// REALITY
    Reality,
}

/// VLESS upstream with transport and camouflage parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VlessUpstream {
    /// Upstream host
    pub server: String,
    /// Upstream port
    #[serde(deserialize_with = "port_value")]
    pub port: u16,
    /// User id
    pub uuid: String,
    /// XTLS flow
    #[serde(default)]
    pub flow: String,
    /// Security layer
    #[serde(default)]
    pub security: Security,
    /// Transport
    #[serde(rename = "type")]
    pub transport: Transport,
    /// TLS / REALITY server name
    #[serde(default)]
    pub sni: String,
    /// uTLS fingerprint
    #[serde(default)]
    pub fp: String,
    /// Comma separated ALPN list
    #[serde(default)]
    pub alpn: String,
    /// REALITY public key
    #[serde(default)]
    pub pbk: String,
    /// REALITY short id
    #[serde(default)]
    pub sid: String,
    /// REALITY spider path
    #[serde(default)]
    pub spx: String,
    /// TCP camouflage header type (`http` or empty)
    #[serde(default, rename = "headerType")]
    pub header_type: String,
    /// Host header, comma separated for HTTP camouflage
    #[serde(default)]
    pub host: String,
    /// Path, comma separated for HTTP camouflage
    #[serde(default)]
    pub path: String,
    /// gRPC authority
    #[serde(default)]
    pub authority: String,
    /// gRPC service name
    #[serde(default, rename = "serviceName")]
    pub service_name: String,
    /// gRPC mode (`multi` or `gun`)
    #[serde(default)]
    pub mode: String,
}

impl VlessUpstream {
    /// HTTP camouflage requested on the TCP transport
    pub fn http_camouflage(&self) -> bool {
        self.header_type == "http"
    }
}

impl ChainDescriptor {
    /// Parse a serialized descriptor
    pub fn parse(raw: &str) -> Result<Self> {
        let descriptor: Self =
            serde_json::from_str(raw).map_err(|e| Error::chain(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Protocol name
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Socks(_) => "socks",
            Self::Http(_) => "http",
            Self::Vless(_) => "vless",
        }
    }

    /// Upstream host
    pub fn server(&self) -> &str {
        match self {
            Self::Socks(up) | Self::Http(up) => &up.server,
            Self::Vless(up) => &up.server,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.server().trim().is_empty() {
            return Err(Error::chain("server is empty"));
        }
        let port = match self {
            Self::Socks(up) | Self::Http(up) => up.port,
            Self::Vless(up) => up.port,
        };
        if port == 0 {
            return Err(Error::chain("port 0 is not allowed"));
        }
        if let Self::Vless(up) = self {
            if up.uuid.is_empty() {
                return Err(Error::chain("vless upstream requires a uuid"));
            }
        }
        Ok(())
    }
}

/// Ports arrive either as numbers or as numeric strings
fn port_value<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(port) => Ok(port),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socks() {
        let descriptor = ChainDescriptor::parse(
            r#"{"protocol":"socks","server":"1.2.3.4","port":"1080","user":"u","pass":"p"}"#,
        )
        .unwrap();
        match descriptor {
            ChainDescriptor::Socks(up) => {
                assert_eq!(up.port, 1080);
                assert_eq!(up.user.as_deref(), Some("u"));
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn test_parse_vless_reality() {
        let descriptor = ChainDescriptor::parse(
            r#"{"protocol":"vless","server":"up.example.com","port":443,"uuid":"id",
                "security":"reality","type":"tcp","sni":"www.microsoft.com","fp":"chrome",
                "pbk":"key","sid":"ab","flow":"xtls-rprx-vision"}"#,
        )
        .unwrap();
        match descriptor {
            ChainDescriptor::Vless(up) => {
                assert_eq!(up.security, Security::Reality);
                assert_eq!(up.transport, Transport::Tcp);
                assert_eq!(up.flow, "xtls-rprx-vision");
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn test_malformed_descriptors() {
        let cases = [
            "{not json",
            r#"{"protocol":"shadowsocks","server":"a.example.com","port":8388}"#,
            r#"{"protocol":"socks","server":"","port":1080}"#,
            r#"{"protocol":"socks","server":"1.2.3.4","port":"http"}"#,
            r#"{"protocol":"vless","server":"a.example.com","port":443,"uuid":"id","type":"kcp"}"#,
            r#"{"protocol":"vless","server":"a.example.com","port":443,"uuid":"id","type":"tcp","security":"xtls"}"#,
            r#"{"protocol":"vless","server":"a.example.com","port":443,"uuid":"","type":"tcp"}"#,
        ];
        for raw in cases {
            let err = ChainDescriptor::parse(raw).unwrap_err();
            assert!(err.is_recoverable(), "{raw} should be a descriptor error");
        }
    }
}
