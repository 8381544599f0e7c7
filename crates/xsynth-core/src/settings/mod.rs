//! User preference model
//!
//! A strongly-typed, validated snapshot of everything a synthesis request
//! depends on, loadable from TOML or JSON. Every section defaults to the
//! values a fresh deployment starts with.

mod client;
mod deployment;
mod store;
mod tunnel;

pub use client::ClientKind;
pub use deployment::{Deployment, DEFAULT_HTTPS_PORTS};
pub use store::{FileSettingsStore, SettingsPatch, SettingsStore};
#[cfg(test)]
pub use store::MockSettingsStore;
pub use tunnel::{TunnelCredentials, WarpAccount};

use crate::address::{endpoint_host, is_domain};
use crate::error::{Error, Result};
use crate::fragment::FragmentRange;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use url::Url;

/// Complete user preference model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Resolver endpoints and DNS toggles
    pub dns: DnsSettings,
    /// Bypass and block policy
    pub routing: RoutingSettings,
    /// TLS ClientHello fragmentation
    pub fragment: FragmentSettings,
    /// Latency probing for balanced documents
    pub probe: ProbeSettings,
    /// Address pool and ports
    pub addresses: AddressSettings,
    /// Enabled tunneled-stream protocols
    pub protocols: ProtocolSettings,
    /// Upstream chain proxy
    pub chain: ChainSettings,
    /// WireGuard tunnel endpoints and noise
    pub warp: WarpSettings,
}

impl ProxySettings {
    /// Load settings from a TOML or JSON file, chosen by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if is_json_path(path) {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// Parse settings from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Parse settings from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(Error::from)
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(Error::from)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.dns.local_dns.trim().is_empty() {
            return Err(Error::invalid("dns.local_dns", "must not be empty"));
        }
        self.remote_dns_host()?;

        self.fragment.length()?;
        self.fragment.interval()?;
        if self.fragment.length_min == 0 {
            return Err(Error::invalid("fragment.length_min", "must be at least 1"));
        }

        if self.probe.best_interval == 0 {
            return Err(Error::invalid("probe.best_interval", "must be at least 1 second"));
        }
        if self.probe.best_warp_interval == 0 {
            return Err(Error::invalid("probe.best_warp_interval", "must be at least 1 second"));
        }

        if self.addresses.ports.is_empty() {
            return Err(Error::invalid("addresses.ports", "at least one port is required"));
        }
        if self.addresses.ports.contains(&0) {
            return Err(Error::invalid("addresses.ports", "port 0 is not allowed"));
        }
        if !self.addresses.custom_cdn_addrs.is_empty()
            && (self.addresses.custom_cdn_host.is_empty() || self.addresses.custom_cdn_sni.is_empty())
        {
            return Err(Error::invalid(
                "addresses.custom_cdn_addrs",
                "custom CDN addresses require custom_cdn_host and custom_cdn_sni",
            ));
        }

        for endpoint in &self.warp.endpoints {
            let port = endpoint
                .rsplit_once(':')
                .map(|(_, port)| port)
                .and_then(|port| port.parse::<u16>().ok());
            if port.is_none() || endpoint_host(endpoint).is_empty() {
                return Err(Error::invalid(
                    "warp.endpoints",
                    format!("'{endpoint}' is not a host:port endpoint"),
                ));
            }
        }

        let noise = [
            ("warp.noise_count", self.warp.noise_count_min, self.warp.noise_count_max),
            ("warp.noise_size", self.warp.noise_size_min, self.warp.noise_size_max),
            ("warp.noise_delay", self.warp.noise_delay_min, self.warp.noise_delay_max),
        ];
        for (key, min, max) in noise {
            if min > max {
                return Err(Error::invalid(key, format!("minimum {min} exceeds maximum {max}")));
            }
        }

        Ok(())
    }

    /// Host part of the remote resolver (URL host, bare IP or bare domain)
    pub fn remote_dns_host(&self) -> Result<String> {
        let remote = self.dns.remote_dns.trim();
        if remote.is_empty() {
            return Err(Error::invalid("dns.remote_dns", "must not be empty"));
        }
        if let Ok(url) = Url::parse(remote) {
            if let Some(host) = url.host_str() {
                return Ok(host.trim_start_matches('[').trim_end_matches(']').to_string());
            }
        }
        if is_domain(remote) || remote.parse::<std::net::IpAddr>().is_ok() {
            return Ok(remote.to_string());
        }
        Err(Error::invalid(
            "dns.remote_dns",
            format!("'{remote}' has no resolvable host"),
        ))
    }

    /// Effective fake-DNS flag for direct or tunnel documents
    pub fn fake_dns(&self, tunnel: bool) -> bool {
        if tunnel {
            self.dns.warp_fake_dns
        } else {
            self.dns.fake_dns
        }
    }

    /// Effective IPv6 flag for direct or tunnel documents
    pub fn ipv6(&self, tunnel: bool) -> bool {
        if tunnel {
            self.dns.warp_enable_ipv6
        } else {
            self.dns.enable_ipv6
        }
    }

    /// Apply a store correction in place
    pub fn apply(&mut self, patch: &SettingsPatch) {
        match patch {
            SettingsPatch::ClearChainProxy => self.chain.params = None,
        }
    }
}

fn is_json_path(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("json")
}

/// DNS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSettings {
    /// Remote resolver reached through the tunnel
    pub remote_dns: String,
    /// Local resolver used for bypassed and destination domains
    pub local_dns: String,
    /// Fake DNS for direct documents
    pub fake_dns: bool,
    /// IPv6 for direct documents
    pub enable_ipv6: bool,
    /// Fake DNS for tunnel documents
    pub warp_fake_dns: bool,
    /// IPv6 for tunnel documents
    pub warp_enable_ipv6: bool,
    /// Static addresses of the remote resolver host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_remote_dns: Option<ResolvedRemoteDns>,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            remote_dns: "https://8.8.8.8/dns-query".to_string(),
            local_dns: "8.8.8.8".to_string(),
            fake_dns: false,
            enable_ipv6: true,
            warp_fake_dns: false,
            warp_enable_ipv6: true,
            resolved_remote_dns: None,
        }
    }
}

/// Pre-resolved remote resolver host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRemoteDns {
    /// Resolver host name
    pub server: String,
    /// Addresses pinned for that host
    pub static_ips: Vec<String>,
}

/// Bypass and block configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Send private ranges direct
    pub bypass_lan: bool,
    /// Send Iranian domains and ranges direct
    pub bypass_iran: bool,
    /// Send Chinese domains and ranges direct
    pub bypass_china: bool,
    /// Send Russian domains and ranges direct
    pub bypass_russia: bool,
    /// Block advertising domains
    pub block_ads: bool,
    /// Block adult domains
    pub block_porn: bool,
    /// Block QUIC (UDP 443)
    pub block_udp443: bool,
    /// Extra domains and IPs sent direct
    #[serde(deserialize_with = "comma_list")]
    pub custom_bypass_rules: Vec<String>,
    /// Extra domains and IPs blocked
    #[serde(deserialize_with = "comma_list")]
    pub custom_block_rules: Vec<String>,
}

impl RoutingSettings {
    /// Any region bypass toggle is active
    pub fn bypass_regions(&self) -> bool {
        self.bypass_iran || self.bypass_china || self.bypass_russia
    }
}

/// Fragmentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentSettings {
    /// Minimum fragment length
    pub length_min: u32,
    /// Maximum fragment length
    pub length_max: u32,
    /// Minimum delay between fragments (ms)
    pub interval_min: u32,
    /// Maximum delay between fragments (ms)
    pub interval_max: u32,
    /// Which packets to fragment
    pub packets: String,
}

impl FragmentSettings {
    /// Length range
    pub fn length(&self) -> Result<FragmentRange> {
        FragmentRange::new(self.length_min, self.length_max)
            .map_err(|_| Error::invalid("fragment.length_min", "must not exceed length_max"))
    }

    /// Interval range
    pub fn interval(&self) -> Result<FragmentRange> {
        FragmentRange::new(self.interval_min, self.interval_max)
            .map_err(|_| Error::invalid("fragment.interval_min", "must not exceed interval_max"))
    }
}

impl Default for FragmentSettings {
    fn default() -> Self {
        Self {
            length_min: 100,
            length_max: 200,
            interval_min: 1,
            interval_max: 1,
            packets: "tlshello".to_string(),
        }
    }
}

/// Latency probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Probe interval for direct best-ping documents (seconds)
    pub best_interval: u32,
    /// Probe interval for tunnel best-ping documents (seconds)
    pub best_warp_interval: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            best_interval: 30,
            best_warp_interval: 30,
        }
    }
}

/// Address pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressSettings {
    /// Prepend the deployment host, the speedtest host and the host's own addresses
    pub include_default_addresses: bool,
    /// User-supplied clean IPs and domains
    #[serde(deserialize_with = "comma_list")]
    pub clean_ips: Vec<String>,
    /// Addresses fronted by a custom CDN
    #[serde(deserialize_with = "comma_list")]
    pub custom_cdn_addrs: Vec<String>,
    /// Host header for custom CDN addresses
    pub custom_cdn_host: String,
    /// SNI for custom CDN addresses
    pub custom_cdn_sni: String,
    /// Relay address hint embedded in the websocket path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_ip: Option<String>,
    /// Destination ports
    pub ports: Vec<u16>,
}

impl Default for AddressSettings {
    fn default() -> Self {
        Self {
            include_default_addresses: true,
            clean_ips: Vec::new(),
            custom_cdn_addrs: Vec::new(),
            custom_cdn_host: String::new(),
            custom_cdn_sni: String::new(),
            proxy_ip: None,
            ports: vec![443],
        }
    }
}

/// Enabled tunneled-stream protocols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Emit VLESS documents
    pub vless: bool,
    /// Emit Trojan documents
    pub trojan: bool,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            vless: true,
            trojan: true,
        }
    }
}

/// Upstream chain proxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Serialized chain descriptor (JSON object)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}

/// WireGuard tunnel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpSettings {
    /// Tunnel endpoints as `host:port`
    #[serde(deserialize_with = "comma_list")]
    pub endpoints: Vec<String>,
    /// Noise mode for the noise-capable client
    pub noise_mode: String,
    /// Minimum noise packet count
    pub noise_count_min: u32,
    /// Maximum noise packet count
    pub noise_count_max: u32,
    /// Minimum noise payload size
    pub noise_size_min: u32,
    /// Maximum noise payload size
    pub noise_size_max: u32,
    /// Minimum delay between noise packets (ms)
    pub noise_delay_min: u32,
    /// Maximum delay between noise packets (ms)
    pub noise_delay_max: u32,
}

impl Default for WarpSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["engage.cloudflareclient.com:2408".to_string()],
            noise_mode: "quic".to_string(),
            noise_count_min: 10,
            noise_count_max: 15,
            noise_size_min: 5,
            noise_size_max: 10,
            noise_delay_min: 1,
            noise_delay_max: 1,
        }
    }
}

/// Split a comma separated list, dropping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts either `"a,b,c"` or `["a", "b", "c"]`
fn comma_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => split_list(&text),
        Raw::List(items) => items.iter().flat_map(|item| split_list(item)).collect(),
    })
}
