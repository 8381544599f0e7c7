//! Configuration documents
//!
//! [`ConfigDocument`] is the aggregate root handed to the proxy engine.
//! Optional sections are `Option` fields and vanish from the serialized
//! output when absent.

pub mod template;

pub use template::{assemble, VariantFlags};

use crate::dns::DnsSection;
use crate::error::{Error, Result};
use crate::outbound::Outbound;
use crate::routing::RoutingRule;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Probe target of the observatory
pub const PROBE_URL: &str = "https://www.gstatic.com/generate_204";

/// A complete proxy engine configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDocument {
    /// Human readable label
    pub remarks: String,
    /// Engine log level
    pub log: LogSection,
    /// DNS section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsSection>,
    /// Local listeners
    pub inbounds: Vec<Inbound>,
    /// Egress paths, in priority order
    pub outbounds: Vec<Outbound>,
    /// Connection policy
    pub policy: Policy,
    /// Routing rules and balancers
    pub routing: RoutingSection,
    /// Latency probing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observatory: Option<Observatory>,
    /// Statistics placeholder
    pub stats: Stats,
}

impl ConfigDocument {
    /// Outbound with `tag`
    pub fn outbound(&self, tag: &str) -> Option<&Outbound> {
        self.outbounds.iter().find(|outbound| outbound.tag == tag)
    }

    /// Remove and return the outbound with `tag`
    pub fn take_outbound(&mut self, tag: &str) -> Option<Outbound> {
        let index = self.outbounds.iter().position(|outbound| outbound.tag == tag)?;
        Some(self.outbounds.remove(index))
    }

    /// Insert outbounds ahead of the existing ones, keeping their order
    pub fn prepend_outbounds<I: IntoIterator<Item = Outbound>>(&mut self, outbounds: I) {
        let mut list: Vec<Outbound> = outbounds.into_iter().collect();
        list.append(&mut self.outbounds);
        self.outbounds = list;
    }

    /// Check that every referenced tag is defined in this document.
    ///
    /// Outbound tags must be unique. Covers rule outbound and balancer
    /// targets, `dialerProxy` links, balancer fallbacks, and the balancer
    /// and observatory selectors, each of which must match an outbound prefix.
    pub fn check_references(&self) -> Result<()> {
        let mut outbound_tags: HashSet<&str> = HashSet::new();
        for outbound in &self.outbounds {
            if !outbound_tags.insert(outbound.tag.as_str()) {
                return Err(Error::DuplicateTag {
                    document: self.remarks.clone(),
                    tag: outbound.tag.clone(),
                });
            }
        }
        let balancers = self.routing.balancers.as_deref().unwrap_or_default();
        let balancer_tags: HashSet<&str> = balancers.iter().map(|b| b.tag.as_str()).collect();

        let dangling = |tag: &str| Error::DanglingTag {
            document: self.remarks.clone(),
            tag: tag.to_string(),
        };
        let selects = |prefix: &str| outbound_tags.iter().any(|tag| tag.starts_with(prefix));

        for rule in &self.routing.rules {
            if let Some(tag) = rule.outbound_tag() {
                if !outbound_tags.contains(tag) {
                    return Err(dangling(tag));
                }
            }
            if let Some(tag) = rule.balancer_tag() {
                if !balancer_tags.contains(tag) {
                    return Err(dangling(tag));
                }
            }
        }

        for outbound in &self.outbounds {
            if let Some(tag) = outbound.dialer_proxy() {
                if !outbound_tags.contains(tag) {
                    return Err(dangling(tag));
                }
            }
        }

        for balancer in balancers {
            if let Some(tag) = balancer.fallback_tag.as_deref() {
                if !outbound_tags.contains(tag) {
                    return Err(dangling(tag));
                }
            }
            if let Some(prefix) = balancer.selector.iter().find(|prefix| !selects(prefix)) {
                return Err(dangling(prefix));
            }
        }

        if let Some(observatory) = &self.observatory {
            if let Some(prefix) = observatory.subject_selector.iter().find(|prefix| !selects(prefix)) {
                return Err(dangling(prefix));
            }
        }

        Ok(())
    }
}

/// Log section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSection {
    /// Level
    pub loglevel: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            loglevel: "warning".to_string(),
        }
    }
}

/// Local listener
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inbound {
    /// Bind address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    /// Port
    pub port: u16,
    /// Protocol
    pub protocol: String,
    /// Listener settings
    pub settings: InboundSettings,
    /// Sniffing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffing: Option<Sniffing>,
    /// Tag
    pub tag: String,
}

impl Inbound {
    fn generic(tag: &str, protocol: &str, port: u16) -> Self {
        Self {
            listen: None,
            port,
            protocol: protocol.to_string(),
            settings: InboundSettings::Proxy {
                auth: "noauth".to_string(),
                udp: true,
                user_level: 8,
            },
            sniffing: Some(Sniffing {
                dest_override: vec!["http".to_string(), "tls".to_string()],
                enabled: true,
                route_only: true,
            }),
            tag: tag.to_string(),
        }
    }

    /// Fixed listener set: SOCKS, HTTP and a local DNS forwarder
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::generic("socks-in", "socks", 10808),
            Self::generic("http-in", "http", 10809),
            Self {
                listen: Some("127.0.0.1".to_string()),
                port: 10853,
                protocol: "dokodemo-door".to_string(),
                settings: InboundSettings::Forward {
                    address: "1.1.1.1".to_string(),
                    network: "tcp,udp".to_string(),
                    port: 53,
                },
                sniffing: None,
                tag: "dns-in".to_string(),
            },
        ]
    }
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InboundSettings {
    /// SOCKS / HTTP listener
    Proxy {
        /// Authentication
        auth: String,
        /// Relay UDP
        udp: bool,
        /// Policy level
        #[serde(rename = "userLevel")]
        user_level: u8,
    },
    /// Fixed-destination forwarder
    Forward {
        /// Destination address
        address: String,
        /// Networks
        network: String,
        /// Destination port
        port: u16,
    },
}

/// Protocol sniffing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sniffing {
    /// Sniffed protocols
    #[serde(rename = "destOverride")]
    pub dest_override: Vec<String>,
    /// Enabled
    pub enabled: bool,
    /// Only use sniffed names for routing
    #[serde(rename = "routeOnly")]
    pub route_only: bool,
}

/// Connection policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    /// Per-level policy
    pub levels: BTreeMap<String, LevelPolicy>,
    /// System statistics
    pub system: SystemPolicy,
}

impl Default for Policy {
    fn default() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(
            "8".to_string(),
            LevelPolicy {
                conn_idle: 300,
                downlink_only: 1,
                handshake: 4,
                uplink_only: 1,
            },
        );
        Self {
            levels,
            system: SystemPolicy {
                stats_outbound_uplink: true,
                stats_outbound_downlink: true,
            },
        }
    }
}

/// Timeouts of one user level (seconds)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelPolicy {
    /// Idle timeout
    #[serde(rename = "connIdle")]
    pub conn_idle: u32,
    /// Timeout after uplink closes
    #[serde(rename = "downlinkOnly")]
    pub downlink_only: u32,
    /// Handshake timeout
    pub handshake: u32,
    /// Timeout after downlink closes
    #[serde(rename = "uplinkOnly")]
    pub uplink_only: u32,
}

/// System statistics toggles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemPolicy {
    /// Outbound uplink counters
    #[serde(rename = "statsOutboundUplink")]
    pub stats_outbound_uplink: bool,
    /// Outbound downlink counters
    #[serde(rename = "statsOutboundDownlink")]
    pub stats_outbound_downlink: bool,
}

/// Routing section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingSection {
    /// Domain resolution strategy for routing
    #[serde(rename = "domainStrategy")]
    pub domain_strategy: String,
    /// Ordered rules
    pub rules: Vec<RoutingRule>,
    /// Balancers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balancers: Option<Vec<Balancer>>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            domain_strategy: "IPIfNonMatch".to_string(),
            rules: Vec::new(),
            balancers: None,
        }
    }
}

/// Least-ping balancer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balancer {
    /// Tag
    pub tag: String,
    /// Outbound tag prefixes
    pub selector: Vec<String>,
    /// Strategy
    pub strategy: BalancerStrategy,
    /// Outbound used when every probe fails
    #[serde(rename = "fallbackTag", skip_serializing_if = "Option::is_none")]
    pub fallback_tag: Option<String>,
}

/// Balancer strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancerStrategy {
    /// Strategy kind
    #[serde(rename = "type")]
    pub kind: String,
}

impl BalancerStrategy {
    /// Lowest measured latency wins
    pub fn least_ping() -> Self {
        Self {
            kind: "leastPing".to_string(),
        }
    }
}

/// Latency observatory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observatory {
    /// Interval between probes, e.g. `"30s"`
    #[serde(rename = "probeInterval")]
    pub probe_interval: String,
    /// Probe URL
    #[serde(rename = "probeURL")]
    pub probe_url: String,
    /// Outbound tag prefixes probed
    #[serde(rename = "subjectSelector")]
    pub subject_selector: Vec<String>,
    /// Probe concurrently
    #[serde(rename = "EnableConcurrency")]
    pub enable_concurrency: bool,
}

/// Empty statistics object
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {}
