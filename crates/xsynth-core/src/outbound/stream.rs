//! Websocket tunneled-stream outbounds

use super::{
    Outbound, OutboundSettings, Protocol, Sockopt, StreamSettings, TlsSettings, TrojanServer,
    VlessUser, VnextServer, WsHeaders, WsSettings, USER_LEVEL,
};
use crate::chain::{Security, Transport};
use crate::settings::Deployment;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

/// Decoy target of the platform-restricted document
pub const DECOY_HOST: &str = "google.com";

/// Wire variant of a tunneled stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    /// VLESS, authenticated by user id
    Vless,
    /// Trojan, authenticated by password
    Trojan,
}

impl StreamProtocol {
    /// Label used in document names
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vless => "VLESS",
            Self::Trojan => "Trojan",
        }
    }

    fn path_prefix(&self) -> &'static str {
        match self {
            Self::Vless => "",
            Self::Trojan => "tr",
        }
    }
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Destination and transport knobs of one tunneled stream
#[derive(Debug, Clone)]
pub struct StreamParams<'a> {
    /// Address dialed
    pub address: &'a str,
    /// Port dialed
    pub port: u16,
    /// Host header
    pub host: &'a str,
    /// TLS server name
    pub sni: &'a str,
    /// Relay hint embedded in the path
    pub proxy_ip: Option<&'a str>,
    /// TLS-secured (port belongs to the HTTPS set)
    pub tls: bool,
    /// Dial through the fragmentation outbound
    pub fragmented: bool,
    /// Skip certificate verification
    pub allow_insecure: bool,
    /// Resolve destinations over IPv6 as well
    pub enable_ipv6: bool,
}

fn random_path(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn ws_path(protocol: StreamProtocol, proxy_ip: Option<&str>) -> String {
    let hint = proxy_ip
        .filter(|ip| !ip.is_empty())
        .map(|ip| format!("/{}", STANDARD.encode(ip)))
        .unwrap_or_default();
    format!("/{}{}{}?ed=2560", protocol.path_prefix(), random_path(16), hint)
}

/// Build a websocket tunneled stream to the deployment
pub fn tunneled_stream(
    protocol: StreamProtocol,
    tag: impl Into<String>,
    deployment: &Deployment,
    params: &StreamParams<'_>,
) -> Outbound {
    let (settings, user_agent) = match protocol {
        StreamProtocol::Vless => (
            OutboundSettings::Vnext {
                vnext: vec![VnextServer {
                    address: params.address.to_string(),
                    port: params.port,
                    users: vec![VlessUser {
                        id: deployment.user_id.clone(),
                        encryption: "none".to_string(),
                        flow: None,
                        level: USER_LEVEL,
                        security: None,
                    }],
                }],
            },
            Some(USER_AGENT.to_string()),
        ),
        StreamProtocol::Trojan => (
            OutboundSettings::Trojan {
                servers: vec![TrojanServer {
                    address: params.address.to_string(),
                    port: params.port,
                    password: deployment.trojan_password.clone(),
                    level: USER_LEVEL,
                }],
            },
            None,
        ),
    };

    let mut stream = StreamSettings {
        network: Some(Transport::Ws),
        security: Some(Security::None),
        ws_settings: Some(WsSettings {
            headers: WsHeaders {
                host: params.host.to_string(),
                user_agent,
            },
            path: ws_path(protocol, params.proxy_ip),
        }),
        ..StreamSettings::default()
    };

    if params.tls {
        stream.security = Some(Security::Tls);
        stream.tls_settings = Some(TlsSettings {
            allow_insecure: params.allow_insecure,
            fingerprint: "randomized".to_string(),
            alpn: vec!["h2".to_string(), "http/1.1".to_string()],
            server_name: params.sni.to_string(),
        });
    }

    stream.sockopt = Some(if params.fragmented {
        Sockopt::dialer("fragment")
    } else {
        Sockopt::plain(params.enable_ipv6)
    });

    Outbound {
        tag: tag.into(),
        protocol: match protocol {
            StreamProtocol::Vless => Protocol::Vless,
            StreamProtocol::Trojan => Protocol::Trojan,
        },
        settings: Some(settings),
        stream_settings: Some(stream),
        mux: None,
    }
}

/// Disguised VLESS outbound pointed at a neutral public host
pub fn workerless_decoy(deployment: &Deployment) -> Outbound {
    let params = StreamParams {
        address: DECOY_HOST,
        port: 443,
        host: &deployment.user_id,
        sni: DECOY_HOST,
        proxy_ip: Some(DECOY_HOST),
        tls: true,
        fragmented: false,
        allow_insecure: true,
        enable_ipv6: false,
    };
    let mut outbound = tunneled_stream(StreamProtocol::Vless, "fake-outbound", deployment, &params);
    if let Some(stream) = outbound.stream_settings.as_mut() {
        stream.sockopt = None;
        if let Some(ws) = stream.ws_settings.as_mut() {
            ws.path = "/".to_string();
        }
    }
    outbound
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Deployment {
        Deployment::new(
            "worker.example.dev",
            "89b3cbba-e6ac-485a-9481-976a0415eab9",
            "secret",
        )
    }

    fn params(port: u16, tls: bool, fragmented: bool) -> StreamParams<'static> {
        StreamParams {
            address: "104.16.1.1",
            port,
            host: "worker.example.dev",
            sni: "WoRkEr.example.dev",
            proxy_ip: None,
            tls,
            fragmented,
            allow_insecure: false,
            enable_ipv6: true,
        }
    }

    #[test]
    fn test_vless_tls() {
        let outbound = tunneled_stream(StreamProtocol::Vless, "proxy", &deployment(), &params(443, true, false));
        let value = serde_json::to_value(&outbound).unwrap();
        assert_eq!(value["protocol"], "vless");
        assert_eq!(value["settings"]["vnext"][0]["users"][0]["id"], "89b3cbba-e6ac-485a-9481-976a0415eab9");
        assert_eq!(value["streamSettings"]["security"], "tls");
        assert_eq!(value["streamSettings"]["tlsSettings"]["alpn"], json!(["h2", "http/1.1"]));
        assert_eq!(value["streamSettings"]["tlsSettings"]["fingerprint"], "randomized");
        assert_eq!(value["streamSettings"]["sockopt"]["tcpKeepAliveIdle"], 30);
        assert_eq!(value["streamSettings"]["sockopt"]["domainStrategy"], "UseIPv4v6");
        assert!(value["streamSettings"]["wsSettings"]["headers"]["User-Agent"].is_string());
    }

    #[test]
    fn test_trojan_plaintext() {
        let outbound = tunneled_stream(StreamProtocol::Trojan, "proxy", &deployment(), &params(80, false, false));
        let value = serde_json::to_value(&outbound).unwrap();
        assert_eq!(value["settings"]["servers"][0]["password"], "secret");
        assert_eq!(value["streamSettings"]["security"], "none");
        assert!(value["streamSettings"].get("tlsSettings").is_none());
        assert!(value["streamSettings"]["wsSettings"]["headers"].get("User-Agent").is_none());

        let path = value["streamSettings"]["wsSettings"]["path"].as_str().unwrap();
        assert!(path.starts_with("/tr"));
        assert!(path.ends_with("?ed=2560"));
    }

    #[test]
    fn test_fragmented_sockopt_supersedes_plain() {
        let outbound = tunneled_stream(StreamProtocol::Vless, "proxy", &deployment(), &params(443, true, true));
        let value = serde_json::to_value(&outbound).unwrap();
        assert_eq!(value["streamSettings"]["sockopt"], json!({"dialerProxy": "fragment"}));
    }

    #[test]
    fn test_proxy_ip_in_path() {
        let mut p = params(443, true, false);
        p.proxy_ip = Some("relay.example.com");
        let outbound = tunneled_stream(StreamProtocol::Vless, "proxy", &deployment(), &p);
        let path = outbound.stream_settings.unwrap().ws_settings.unwrap().path;
        let hint = STANDARD.encode("relay.example.com");
        assert!(path.ends_with(&format!("/{hint}?ed=2560")));
        assert_eq!(path.len(), 1 + 16 + 1 + hint.len() + "?ed=2560".len());
    }

    #[test]
    fn test_decoy() {
        let outbound = workerless_decoy(&deployment());
        let value = serde_json::to_value(&outbound).unwrap();
        assert_eq!(value["tag"], "fake-outbound");
        assert_eq!(value["settings"]["vnext"][0]["address"], "google.com");
        assert_eq!(value["streamSettings"]["wsSettings"]["path"], "/");
        assert_eq!(value["streamSettings"]["wsSettings"]["headers"]["Host"], "89b3cbba-e6ac-485a-9481-976a0415eab9");
        assert_eq!(value["streamSettings"]["tlsSettings"]["allowInsecure"], true);
        assert!(value["streamSettings"].get("sockopt").is_none());
    }
}
