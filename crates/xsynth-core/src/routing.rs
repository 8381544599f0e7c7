//! Routing rule builder
//!
//! The rule list is evaluated first-match-wins, so emission order is part of
//! the contract:
//!
//! 1. DNS interception (control-plane resolver, port 53 on the listeners)
//! 2. local resolver bypass
//! 3. geo and custom bypass/block rules
//! 4. UDP 443 block
//! 5. chain control traffic
//! 6. catch-all

use crate::address::is_domain;
use crate::dns::block_categories;
use crate::error::Result;
use crate::settings::ProxySettings;
use serde::Serialize;
use tracing::debug;

/// Balancer over every protocol (or chain) outbound
pub const BALANCER_ALL: &str = "all";

/// Balancer over protocol outbounds when chaining
pub const BALANCER_ALL_PROXY: &str = "all-proxy";

/// Network match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleNetwork {
    /// TCP only
    #[serde(rename = "tcp")]
    Tcp,
    /// UDP only
    #[serde(rename = "udp")]
    Udp,
    /// Both
    #[serde(rename = "tcp,udp")]
    TcpUdp,
}

/// What a rule matches on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleMatch {
    /// Traffic arriving on listeners
    Inbound {
        /// Listener tags
        #[serde(rename = "inboundTag")]
        inbound_tag: Vec<String>,
        /// Destination port
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<String>,
    },
    /// Destination domains
    Domain {
        /// Domain patterns
        domain: Vec<String>,
        /// Network
        #[serde(skip_serializing_if = "Option::is_none")]
        network: Option<RuleNetwork>,
    },
    /// Destination addresses
    Ip {
        /// IPs, CIDRs or geoip categories
        ip: Vec<String>,
        /// Destination port
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<String>,
        /// Network
        #[serde(skip_serializing_if = "Option::is_none")]
        network: Option<RuleNetwork>,
    },
    /// Network and optional port
    Network {
        /// Network
        network: RuleNetwork,
        /// Destination port
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<String>,
    },
}

/// Where matched traffic goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleTarget {
    /// An outbound tag
    #[serde(rename = "outboundTag")]
    Outbound(String),
    /// A balancer tag
    #[serde(rename = "balancerTag")]
    Balancer(String),
}

impl RuleTarget {
    /// Target an outbound
    pub fn outbound(tag: impl Into<String>) -> Self {
        Self::Outbound(tag.into())
    }

    /// Target a balancer
    pub fn balancer(tag: impl Into<String>) -> Self {
        Self::Balancer(tag.into())
    }
}

/// One routing rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingRule {
    /// Match
    #[serde(flatten)]
    pub matcher: RuleMatch,
    /// Target
    #[serde(flatten)]
    pub target: RuleTarget,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl RoutingRule {
    /// Rule sending `matcher` to `target`
    pub fn new(matcher: RuleMatch, target: RuleTarget) -> Self {
        Self {
            matcher,
            target,
            kind: "field",
        }
    }

    /// Outbound tag, if the rule targets an outbound
    pub fn outbound_tag(&self) -> Option<&str> {
        match &self.target {
            RuleTarget::Outbound(tag) => Some(tag),
            RuleTarget::Balancer(_) => None,
        }
    }

    /// Balancer tag, if the rule targets a balancer
    pub fn balancer_tag(&self) -> Option<&str> {
        match &self.target {
            RuleTarget::Balancer(tag) => Some(tag),
            RuleTarget::Outbound(_) => None,
        }
    }
}

/// Builds the ordered rule list of one document
#[derive(Debug, Clone)]
pub struct RoutingBuilder<'a> {
    settings: &'a ProxySettings,
    destinations: &'a [String],
    chained: bool,
    balanced: bool,
    workerless: bool,
    tunnel: bool,
}

impl<'a> RoutingBuilder<'a> {
    /// Builder scoped to `destinations`
    pub fn new(settings: &'a ProxySettings, destinations: &'a [String]) -> Self {
        Self {
            settings,
            destinations,
            chained: false,
            balanced: false,
            workerless: false,
            tunnel: false,
        }
    }

    /// Route through a chain outbound
    pub fn chained(mut self, chained: bool) -> Self {
        self.chained = chained;
        self
    }

    /// Route through balancers
    pub fn balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    /// Platform-restricted mode
    pub fn workerless(mut self, workerless: bool) -> Self {
        self.workerless = workerless;
        self
    }

    /// Tunnel mode
    pub fn tunnel(mut self, tunnel: bool) -> Self {
        self.tunnel = tunnel;
        self
    }

    /// Build the rule list
    pub fn build(&self) -> Result<Vec<RoutingRule>> {
        let settings = self.settings;
        let routing = &settings.routing;

        let mut rules = vec![
            RoutingRule::new(
                RuleMatch::Inbound {
                    inbound_tag: vec!["dns-in".to_string()],
                    port: None,
                },
                RuleTarget::outbound("dns-out"),
            ),
            RoutingRule::new(
                RuleMatch::Inbound {
                    inbound_tag: vec!["socks-in".to_string(), "http-in".to_string()],
                    port: Some("53".to_string()),
                },
                RuleTarget::outbound("dns-out"),
            ),
        ];

        let domain_destinations = self.destinations.iter().any(|d| is_domain(d))
            || routing.custom_bypass_rules.iter().any(|d| is_domain(d));
        let bypass = routing.bypass_regions() || !routing.custom_bypass_rules.is_empty();
        if !self.workerless && (domain_destinations || bypass) {
            rules.push(RoutingRule::new(
                RuleMatch::Ip {
                    ip: vec![settings.dns.local_dns.clone()],
                    port: Some("53".to_string()),
                    network: Some(RuleNetwork::Udp),
                },
                RuleTarget::outbound("direct"),
            ));
        }

        let mut direct_domains = Vec::new();
        let mut direct_ips = Vec::new();
        let mut block_domains: Vec<String> = block_categories(settings).map(str::to_string).collect();
        let mut block_ips = Vec::new();

        let regions = [
            (routing.bypass_lan, "geosite:private", "geoip:private"),
            (routing.bypass_iran, "geosite:category-ir", "geoip:ir"),
            (routing.bypass_china, "geosite:cn", "geoip:cn"),
            (routing.bypass_russia, "geosite:category-ru", "geoip:ru"),
        ];
        for (_, domain, ip) in regions.iter().filter(|(enabled, _, _)| *enabled) {
            direct_domains.push(domain.to_string());
            direct_ips.push(ip.to_string());
        }
        for entry in &routing.custom_bypass_rules {
            if is_domain(entry) {
                direct_domains.push(format!("domain:{entry}"));
            } else {
                direct_ips.push(entry.clone());
            }
        }
        for entry in &routing.custom_block_rules {
            if is_domain(entry) {
                block_domains.push(format!("domain:{entry}"));
            } else {
                block_ips.push(entry.clone());
            }
        }

        if !self.workerless {
            push_domain_rule(&mut rules, direct_domains, "direct");
            push_ip_rule(&mut rules, direct_ips, "direct");
        }
        push_domain_rule(&mut rules, block_domains, "block");
        push_ip_rule(&mut rules, block_ips, "block");

        if routing.block_udp443 {
            rules.push(RoutingRule::new(
                RuleMatch::Network {
                    network: RuleNetwork::Udp,
                    port: Some("443".to_string()),
                },
                RuleTarget::outbound("block"),
            ));
        }

        if self.chained {
            let target = if self.balanced {
                RuleTarget::balancer(BALANCER_ALL_PROXY)
            } else {
                RuleTarget::outbound("proxy")
            };
            let matcher = if self.tunnel {
                RuleMatch::Network {
                    network: RuleNetwork::Udp,
                    port: Some("53".to_string()),
                }
            } else {
                let host = settings.remote_dns_host()?;
                if is_domain(&host) {
                    RuleMatch::Domain {
                        domain: vec![host],
                        network: Some(RuleNetwork::Tcp),
                    }
                } else {
                    RuleMatch::Ip {
                        ip: vec![host],
                        port: None,
                        network: Some(RuleNetwork::Tcp),
                    }
                }
            };
            rules.push(RoutingRule::new(matcher, target));
        }

        let catch_all = if self.balanced {
            RuleTarget::balancer(BALANCER_ALL)
        } else if self.chained {
            RuleTarget::outbound("chain")
        } else if self.workerless {
            RuleTarget::outbound("fragment")
        } else {
            RuleTarget::outbound("proxy")
        };
        rules.push(RoutingRule::new(
            RuleMatch::Network {
                network: RuleNetwork::TcpUdp,
                port: None,
            },
            catch_all,
        ));

        debug!(
            rules = rules.len(),
            chained = self.chained,
            balanced = self.balanced,
            "Built routing rules"
        );
        Ok(rules)
    }
}

fn push_domain_rule(rules: &mut Vec<RoutingRule>, domain: Vec<String>, outbound: &str) {
    if !domain.is_empty() {
        rules.push(RoutingRule::new(
            RuleMatch::Domain { domain, network: None },
            RuleTarget::outbound(outbound),
        ));
    }
}

fn push_ip_rule(rules: &mut Vec<RoutingRule>, ip: Vec<String>, outbound: &str) {
    if !ip.is_empty() {
        rules.push(RoutingRule::new(
            RuleMatch::Ip {
                ip,
                port: None,
                network: None,
            },
            RuleTarget::outbound(outbound),
        ));
    }
}
