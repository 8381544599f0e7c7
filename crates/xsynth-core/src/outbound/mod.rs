//! Outbound descriptors
//!
//! Typed mirror of the proxy engine's outbound schema. Builders live in the
//! submodules:
//!
//! - [`stream`]: websocket tunneled streams (VLESS and Trojan)
//! - [`wireguard`]: WireGuard tunnels
//! - [`chain`]: user-supplied upstream chain proxies
//!
//! Every outbound carries a unique `tag`. Variant documents never share an
//! outbound: [`Outbound::derive`] produces an owned copy with a new tag and,
//! optionally, a re-linked `dialerProxy`.

pub mod chain;
pub mod stream;
pub mod wireguard;

pub use chain::chain_outbound;
pub use stream::{tunneled_stream, workerless_decoy, StreamParams, StreamProtocol};
pub use wireguard::wireguard_tunnel;

use crate::chain::{Security, Transport};
use crate::fragment::FragmentRange;
use serde::Serialize;

/// User level shared by every credential and inbound
pub const USER_LEVEL: u8 = 8;

/// Outbound protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// VLESS
    Vless,
    /// Trojan
    Trojan,
    /// WireGuard
    Wireguard,
    /// SOCKS5
    Socks,
    /// HTTP CONNECT
    Http,
    /// Direct egress, optionally fragmenting
    Freedom,
    /// DNS handler
    Dns,
    /// Drop
    Blackhole,
}

/// One outbound of a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    /// Cross-reference tag
    pub tag: String,
    /// Protocol
    pub protocol: Protocol,
    /// Protocol settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<OutboundSettings>,
    /// Transport settings
    #[serde(rename = "streamSettings", skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<StreamSettings>,
    /// Multiplexing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<Mux>,
}

impl Outbound {
    /// Copy of this outbound under a new tag, optionally dialing through `dialer`
    pub fn derive(&self, tag: impl Into<String>, dialer: Option<&str>) -> Outbound {
        let mut copy = Outbound {
            tag: tag.into(),
            protocol: self.protocol,
            settings: self.settings.clone(),
            stream_settings: self.stream_settings.clone(),
            mux: self.mux.clone(),
        };
        if let Some(dialer) = dialer {
            copy.set_dialer_proxy(dialer);
        }
        copy
    }

    /// Tag this outbound dials through, if any
    pub fn dialer_proxy(&self) -> Option<&str> {
        self.stream_settings
            .as_ref()
            .and_then(|stream| stream.sockopt.as_ref())
            .and_then(|sockopt| sockopt.dialer_proxy.as_deref())
    }

    /// Route this outbound's connections through `tag`
    pub fn set_dialer_proxy(&mut self, tag: impl Into<String>) {
        let stream = self.stream_settings.get_or_insert_with(StreamSettings::default);
        let sockopt = stream.sockopt.get_or_insert_with(Sockopt::default);
        sockopt.dialer_proxy = Some(tag.into());
    }

    /// Fragment parameters of a freedom outbound
    pub fn fragment_mut(&mut self) -> Option<&mut FragmentParams> {
        match self.settings.as_mut() {
            Some(OutboundSettings::Freedom(freedom)) => freedom.fragment.as_mut(),
            _ => None,
        }
    }

    pub(crate) fn dns_out() -> Self {
        Self::fixed("dns-out", Protocol::Dns, None)
    }

    pub(crate) fn direct() -> Self {
        Self::fixed(
            "direct",
            Protocol::Freedom,
            Some(OutboundSettings::Freedom(FreedomSettings::default())),
        )
    }

    pub(crate) fn block() -> Self {
        Self::fixed(
            "block",
            Protocol::Blackhole,
            Some(OutboundSettings::Blackhole {
                response: BlackholeResponse { kind: "http".to_string() },
            }),
        )
    }

    fn fixed(tag: &str, protocol: Protocol, settings: Option<OutboundSettings>) -> Self {
        Self {
            tag: tag.to_string(),
            protocol,
            settings,
            stream_settings: None,
            mux: None,
        }
    }
}

/// Protocol-specific settings block
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundSettings {
    /// VLESS servers
    Vnext {
        /// Server list
        vnext: Vec<VnextServer>,
    },
    /// Trojan servers
    Trojan {
        /// Server list
        servers: Vec<TrojanServer>,
    },
    /// SOCKS / HTTP servers
    Proxy {
        /// Server list
        servers: Vec<ProxyServer>,
    },
    /// WireGuard interface and peer
    Wireguard(WireGuardSettings),
    /// Freedom, optionally fragmenting
    Freedom(FreedomSettings),
    /// Blackhole
    Blackhole {
        /// Response sent before dropping
        response: BlackholeResponse,
    },
}

/// VLESS server entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VnextServer {
    /// Server address
    pub address: String,
    /// Server port
    pub port: u16,
    /// Users
    pub users: Vec<VlessUser>,
}

/// VLESS user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VlessUser {
    /// User id
    pub id: String,
    /// Always `none`
    pub encryption: String,
    /// XTLS flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    /// User level
    pub level: u8,
    /// Upstream security hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
}

/// Trojan server entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrojanServer {
    /// Server address
    pub address: String,
    /// Server port
    pub port: u16,
    /// Password
    pub password: String,
    /// User level
    pub level: u8,
}

/// SOCKS / HTTP server entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyServer {
    /// Server address
    pub address: String,
    /// Server port
    pub port: u16,
    /// Credentials
    pub users: Vec<ProxyUser>,
}

/// SOCKS / HTTP credentials
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyUser {
    /// User name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    /// User level
    pub level: u8,
}

/// WireGuard settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireGuardSettings {
    /// Interface addresses
    pub address: Vec<String>,
    /// MTU
    pub mtu: u16,
    /// Peers
    pub peers: Vec<WireGuardPeer>,
    /// Reserved bytes
    pub reserved: [u8; 3],
    /// Interface private key
    #[serde(rename = "secretKey")]
    pub secret_key: String,
    /// Noise mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wnoise: Option<String>,
    /// Noise packet count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wnoisecount: Option<NoiseValue>,
    /// Noise payload size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wpayloadsize: Option<NoiseValue>,
    /// Delay between noise packets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wnoisedelay: Option<NoiseValue>,
}

/// WireGuard peer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireGuardPeer {
    /// `host:port`
    pub endpoint: String,
    /// Peer public key
    #[serde(rename = "publicKey")]
    pub public_key: String,
    /// Keep-alive interval (seconds)
    #[serde(rename = "keepAlive")]
    pub keep_alive: u32,
}

/// Noise parameter, a single value or a `"min-max"` range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NoiseValue {
    /// min == max
    Single(u32),
    /// min < max
    Range(FragmentRange),
}

/// Freedom settings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FreedomSettings {
    /// Fragmentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<FragmentParams>,
    /// Resolution strategy
    #[serde(rename = "domainStrategy", skip_serializing_if = "Option::is_none")]
    pub domain_strategy: Option<DomainStrategy>,
}

/// Fragmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentParams {
    /// Packets to fragment
    pub packets: String,
    /// Fragment length range
    pub length: FragmentRange,
    /// Delay range between fragments
    pub interval: FragmentRange,
}

/// Blackhole response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlackholeResponse {
    /// Response kind
    #[serde(rename = "type")]
    pub kind: String,
}

/// Resolution strategy for dialed domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DomainStrategy {
    /// IPv4 and IPv6
    UseIPv4v6,
    /// IPv4 only
    UseIPv4,
}

impl DomainStrategy {
    /// Strategy for the given IPv6 toggle
    pub fn for_ipv6(enable_ipv6: bool) -> Self {
        if enable_ipv6 {
            Self::UseIPv4v6
        } else {
            Self::UseIPv4
        }
    }
}

/// Transport settings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamSettings {
    /// Transport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Transport>,
    /// Security layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
    /// Socket options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sockopt: Option<Sockopt>,
    /// TLS
    #[serde(rename = "tlsSettings", skip_serializing_if = "Option::is_none")]
    pub tls_settings: Option<TlsSettings>,
    /// REALITY
    #[serde(rename = "realitySettings", skip_serializing_if = "Option::is_none")]
    pub reality_settings: Option<RealitySettings>,
    /// TCP camouflage
    #[serde(rename = "tcpSettings", skip_serializing_if = "Option::is_none")]
    pub tcp_settings: Option<TcpSettings>,
    /// WebSocket
    #[serde(rename = "wsSettings", skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
    /// gRPC
    #[serde(rename = "grpcSettings", skip_serializing_if = "Option::is_none")]
    pub grpc_settings: Option<GrpcSettings>,
}

/// Socket options
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sockopt {
    /// Outbound tag to dial through
    #[serde(rename = "dialerProxy", skip_serializing_if = "Option::is_none")]
    pub dialer_proxy: Option<String>,
    /// TCP keep-alive idle (seconds)
    #[serde(rename = "tcpKeepAliveIdle", skip_serializing_if = "Option::is_none")]
    pub tcp_keep_alive_idle: Option<u32>,
    /// Disable Nagle
    #[serde(rename = "tcpNoDelay", skip_serializing_if = "Option::is_none")]
    pub tcp_no_delay: Option<bool>,
    /// Resolution strategy
    #[serde(rename = "domainStrategy", skip_serializing_if = "Option::is_none")]
    pub domain_strategy: Option<DomainStrategy>,
}

impl Sockopt {
    /// Keep-alive, no-delay and domain strategy for a plaintext socket
    pub fn plain(enable_ipv6: bool) -> Self {
        Self {
            dialer_proxy: None,
            tcp_keep_alive_idle: Some(30),
            tcp_no_delay: Some(true),
            domain_strategy: Some(DomainStrategy::for_ipv6(enable_ipv6)),
        }
    }

    /// Dial through another outbound
    pub fn dialer(tag: impl Into<String>) -> Self {
        Self {
            dialer_proxy: Some(tag.into()),
            ..Self::default()
        }
    }
}

/// TLS settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsSettings {
    /// Skip certificate verification
    #[serde(rename = "allowInsecure")]
    pub allow_insecure: bool,
    /// uTLS fingerprint
    pub fingerprint: String,
    /// ALPN
    pub alpn: Vec<String>,
    /// SNI
    #[serde(rename = "serverName")]
    pub server_name: String,
}

/// REALITY settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealitySettings {
    /// uTLS fingerprint
    pub fingerprint: String,
    /// Server public key
    #[serde(rename = "publicKey")]
    pub public_key: String,
    /// SNI
    #[serde(rename = "serverName")]
    pub server_name: String,
    /// Short id
    #[serde(rename = "shortId")]
    pub short_id: String,
    /// Spider path
    #[serde(rename = "spiderX")]
    pub spider_x: String,
}

/// TCP settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcpSettings {
    /// Camouflage header
    pub header: TcpHeader,
}

/// TCP camouflage header
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TcpHeader {
    /// No camouflage
    None,
    /// HTTP/1.1 camouflage
    Http {
        /// Request template
        request: HttpRequestTemplate,
        /// Response template
        response: HttpResponseTemplate,
    },
}

/// Camouflage request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequestTemplate {
    /// Headers
    pub headers: RequestHeaders,
    /// Method
    pub method: String,
    /// Candidate paths
    pub path: Vec<String>,
    /// HTTP version
    pub version: String,
}

/// Camouflage request headers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestHeaders {
    /// Candidate hosts
    #[serde(rename = "Host")]
    pub host: Vec<String>,
}

/// Camouflage response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponseTemplate {
    /// Headers
    pub headers: ResponseHeaders,
    /// Reason phrase
    pub reason: String,
    /// Status code
    pub status: String,
    /// HTTP version
    pub version: String,
}

/// Camouflage response headers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseHeaders {
    /// Content types
    #[serde(rename = "Content-Type")]
    pub content_type: Vec<String>,
}

/// WebSocket settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsSettings {
    /// Upgrade request headers
    pub headers: WsHeaders,
    /// Request path
    pub path: String,
}

/// WebSocket headers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsHeaders {
    /// Host header
    #[serde(rename = "Host")]
    pub host: String,
    /// Browser user agent
    #[serde(rename = "User-Agent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// gRPC settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrpcSettings {
    /// Authority
    pub authority: String,
    /// Multi-mode streams
    #[serde(rename = "multiMode")]
    pub multi_mode: bool,
    /// Service name
    #[serde(rename = "serviceName")]
    pub service_name: String,
}

/// Multiplexing block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mux {
    /// Enabled
    pub enabled: bool,
    /// Max concurrent streams
    pub concurrency: u32,
    /// Max concurrent XUDP streams
    #[serde(rename = "xudpConcurrency")]
    pub xudp_concurrency: u32,
    /// Handling of proxied UDP 443
    #[serde(rename = "xudpProxyUDP443")]
    pub xudp_proxy_udp443: String,
}

impl Default for Mux {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 8,
            xudp_concurrency: 16,
            xudp_proxy_udp443: "reject".to_string(),
        }
    }
}
