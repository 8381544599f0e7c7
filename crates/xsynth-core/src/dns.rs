//! DNS section builder
//!
//! Server list order is fixed: the fake-DNS entry (if any) first, then the
//! domain-routed local entry, then the region-bypass local entry, then the
//! primary resolver(s).

use crate::address::is_domain;
use crate::error::Result;
use crate::resolver::{ResolvedAddrs, Resolver};
use crate::settings::ProxySettings;
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Null-route address for blocked names
pub const NULL_ROUTE: &str = "127.0.0.1";

/// Resolver of the platform-restricted document
pub const WORKERLESS_DOH: &str = "https://cloudflare-dns.com/dns-query";

/// Domains pinned so the platform-restricted document can reach its resolver
pub const BOOTSTRAP_DOMAINS: [&str; 3] = ["cloudflare-dns.com", "cloudflare.com", "dash.cloudflare.com"];

const TUNNEL_DNS_V4: [&str; 2] = ["1.1.1.1", "1.0.0.1"];
const TUNNEL_DNS_V6: [&str; 2] = ["2606:4700:4700::1111", "2606:4700:4700::1001"];

/// Geo categories resolved locally when their bypass toggle is on
pub(crate) fn bypass_categories(settings: &ProxySettings) -> impl Iterator<Item = (&'static str, &'static str)> {
    let routing = &settings.routing;
    [
        (routing.bypass_iran, "geosite:category-ir", "geoip:ir"),
        (routing.bypass_china, "geosite:cn", "geoip:cn"),
        (routing.bypass_russia, "geosite:category-ru", "geoip:ru"),
    ]
    .into_iter()
    .filter(|(enabled, _, _)| *enabled)
    .map(|(_, domain, ip)| (domain, ip))
}

/// Geo categories null-routed when their block toggle is on
pub(crate) fn block_categories(settings: &ProxySettings) -> impl Iterator<Item = &'static str> {
    let routing = &settings.routing;
    [
        (routing.block_ads, "geosite:category-ads-all"),
        (routing.block_ads, "geosite:category-ads-ir"),
        (routing.block_porn, "geosite:category-porn"),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, domain)| domain)
}

/// IP version used for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryStrategy {
    /// IPv4 and IPv6
    UseIP,
    /// IPv4 only
    UseIPv4,
}

/// One DNS server entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DnsServer {
    /// Plain resolver address
    Plain(String),
    /// Resolver restricted to a domain list
    Scoped(ScopedServer),
}

/// Domain-scoped resolver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedServer {
    /// Resolver address
    pub address: String,
    /// Domains routed to this resolver
    pub domains: Vec<String>,
    /// Accepted answer ranges
    #[serde(rename = "expectIPs", skip_serializing_if = "Option::is_none")]
    pub expect_ips: Option<Vec<String>>,
    /// Never fall back to other servers for these domains
    #[serde(rename = "skipFallback", skip_serializing_if = "Option::is_none")]
    pub skip_fallback: Option<bool>,
}

/// DNS section of a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsSection {
    /// Static host overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<BTreeMap<String, Vec<String>>>,
    /// Ordered server list
    pub servers: Vec<DnsServer>,
    /// IP version strategy
    #[serde(rename = "queryStrategy")]
    pub query_strategy: QueryStrategy,
    /// Section tag
    pub tag: String,
}

/// Builds a [`DnsSection`] for a set of destinations
#[derive(Debug, Clone)]
pub struct DnsBuilder<'a> {
    settings: &'a ProxySettings,
    destinations: &'a [String],
    static_target: Option<&'a str>,
    workerless: bool,
    tunnel: bool,
}

impl<'a> DnsBuilder<'a> {
    /// Builder scoped to `destinations`
    pub fn new(settings: &'a ProxySettings, destinations: &'a [String]) -> Self {
        Self {
            settings,
            destinations,
            static_target: None,
            workerless: false,
            tunnel: false,
        }
    }

    /// Pin `domain` to its resolved addresses
    pub fn static_target(mut self, domain: Option<&'a str>) -> Self {
        self.static_target = domain;
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

    /// Build the section, resolving pinned names concurrently
    pub async fn build<R: Resolver + ?Sized>(&self, resolver: &R) -> Result<DnsSection> {
        let settings = self.settings;
        let fake_dns = settings.fake_dns(self.tunnel);
        let ipv6 = settings.ipv6(self.tunnel);

        let mut hosts = BTreeMap::new();
        for category in block_categories(settings) {
            hosts.insert(category.to_string(), vec![NULL_ROUTE.to_string()]);
        }
        for domain in settings.routing.custom_block_rules.iter().filter(|d| is_domain(d)) {
            hosts.insert(format!("domain:{domain}"), vec![NULL_ROUTE.to_string()]);
        }

        let mut lookups: Vec<&str> = Vec::new();
        lookups.extend(self.static_target);
        if self.workerless {
            lookups.extend(BOOTSTRAP_DOMAINS);
        }
        let resolved: Vec<ResolvedAddrs> =
            try_join_all(lookups.iter().map(|domain| resolver.resolve(domain))).await?;
        let mut resolved = resolved.into_iter();

        if let Some(target) = self.static_target {
            if let Some(addrs) = resolved.next() {
                hosts.insert(target.to_string(), addrs.select(target, ipv6)?);
            }
        }

        if let Some(remote) = &settings.dns.resolved_remote_dns {
            if !remote.server.is_empty() && !self.workerless && !self.tunnel {
                hosts.insert(remote.server.clone(), remote.static_ips.clone());
            }
        }

        if self.workerless {
            let mut v4 = Vec::new();
            let mut v6 = Vec::new();
            for (domain, addrs) in BOOTSTRAP_DOMAINS.iter().zip(resolved) {
                addrs.select(domain, ipv6)?;
                v4.extend(addrs.ipv4.iter().map(ToString::to_string));
                if ipv6 {
                    v6.extend(addrs.ipv6.iter().map(ToString::to_string));
                }
            }
            v4.extend(v6);
            hosts.insert(BOOTSTRAP_DOMAINS[0].to_string(), v4);
        }

        let primary: Vec<DnsServer> = if self.workerless {
            vec![DnsServer::Plain(WORKERLESS_DOH.to_string())]
        } else if self.tunnel {
            let mut servers: Vec<&str> = TUNNEL_DNS_V4.to_vec();
            if settings.dns.warp_enable_ipv6 {
                servers.extend(TUNNEL_DNS_V6);
            }
            servers.into_iter().map(|s| DnsServer::Plain(s.to_string())).collect()
        } else {
            vec![DnsServer::Plain(settings.dns.remote_dns.clone())]
        };

        let mut servers = Vec::new();

        // Distinct destination domains, first occurrence wins
        let mut routed: Vec<String> = Vec::new();
        for domain in self.destinations.iter().filter(|d| is_domain(d)) {
            let entry = format!("full:{domain}");
            if !routed.contains(&entry) {
                routed.push(entry);
            }
        }
        routed.extend(
            settings
                .routing
                .custom_bypass_rules
                .iter()
                .filter(|d| is_domain(d))
                .map(|d| format!("domain:{d}")),
        );
        if !routed.is_empty() {
            servers.push(DnsServer::Scoped(ScopedServer {
                address: settings.dns.local_dns.clone(),
                domains: routed,
                expect_ips: None,
                skip_fallback: Some(true),
            }));
        }

        let bypass_local = if self.workerless {
            None
        } else {
            let (domains, expect_ips): (Vec<String>, Vec<String>) = bypass_categories(settings)
                .map(|(domain, ip)| (domain.to_string(), ip.to_string()))
                .unzip();
            (!domains.is_empty()).then(|| ScopedServer {
                address: settings.dns.local_dns.clone(),
                domains,
                expect_ips: Some(expect_ips),
                skip_fallback: Some(true),
            })
        };

        if fake_dns {
            let fake = match &bypass_local {
                Some(local) => DnsServer::Scoped(ScopedServer {
                    address: "fakedns".to_string(),
                    domains: local.domains.clone(),
                    expect_ips: None,
                    skip_fallback: None,
                }),
                None => DnsServer::Plain("fakedns".to_string()),
            };
            servers.insert(0, fake);
        }

        if let Some(local) = bypass_local {
            servers.push(DnsServer::Scoped(local));
        }
        servers.extend(primary);

        debug!(
            servers = servers.len(),
            hosts = hosts.len(),
            workerless = self.workerless,
            tunnel = self.tunnel,
            "Built DNS section"
        );

        Ok(DnsSection {
            hosts: (!hosts.is_empty()).then_some(hosts),
            servers,
            query_strategy: if ipv6 {
                QueryStrategy::UseIP
            } else {
                QueryStrategy::UseIPv4
            },
            tag: "dns".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MockResolver;
    use serde_json::json;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn no_lookups() -> MockResolver {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().never();
        resolver
    }

    #[tokio::test]
    async fn test_minimal_section() {
        let settings = ProxySettings::default();
        let section = DnsBuilder::new(&settings, &["104.16.1.1".to_string()])
            .build(&no_lookups())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(section).unwrap(),
            json!({"servers": ["https://8.8.8.8/dns-query"], "queryStrategy": "UseIP", "tag": "dns"})
        );
    }

    #[tokio::test]
    async fn test_server_order() {
        let mut settings = ProxySettings::default();
        settings.dns.fake_dns = true;
        settings.routing.bypass_iran = true;
        settings.routing.custom_bypass_rules = vec!["example.ir".to_string()];

        let destinations = vec!["worker.example.dev".to_string(), "worker.example.dev".to_string()];
        let section = DnsBuilder::new(&settings, &destinations)
            .build(&no_lookups())
            .await
            .unwrap();
        let value = serde_json::to_value(section).unwrap();
        assert_eq!(
            value["servers"],
            json!([
                {"address": "fakedns", "domains": ["geosite:category-ir"]},
                {"address": "8.8.8.8", "domains": ["full:worker.example.dev", "domain:example.ir"], "skipFallback": true},
                {"address": "8.8.8.8", "domains": ["geosite:category-ir"], "expectIPs": ["geoip:ir"], "skipFallback": true},
                "https://8.8.8.8/dns-query"
            ])
        );
    }

    #[tokio::test]
    async fn test_block_hosts() {
        let mut settings = ProxySettings::default();
        settings.routing.block_ads = true;
        settings.routing.custom_block_rules = vec!["tracker.example.com".to_string(), "6.6.6.6".to_string()];
        let section = DnsBuilder::new(&settings, &[]).build(&no_lookups()).await.unwrap();
        let hosts = section.hosts.unwrap();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts["geosite:category-ads-all"], vec!["127.0.0.1"]);
        assert_eq!(hosts["domain:tracker.example.com"], vec!["127.0.0.1"]);
    }

    #[tokio::test]
    async fn test_tunnel_servers() {
        let mut settings = ProxySettings::default();
        settings.dns.warp_enable_ipv6 = false;
        settings.dns.resolved_remote_dns = Some(crate::settings::ResolvedRemoteDns {
            server: "dns.google".to_string(),
            static_ips: vec!["8.8.8.8".to_string()],
        });
        let section = DnsBuilder::new(&settings, &[]).tunnel(true).build(&no_lookups()).await.unwrap();
        assert!(section.hosts.is_none());
        assert_eq!(section.query_strategy, QueryStrategy::UseIPv4);
        assert_eq!(
            section.servers,
            vec![DnsServer::Plain("1.1.1.1".to_string()), DnsServer::Plain("1.0.0.1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_tunnel_servers_with_ipv6() {
        let mut settings = ProxySettings::default();
        settings.dns.warp_enable_ipv6 = true;
        settings.dns.enable_ipv6 = false;
        let section = DnsBuilder::new(&settings, &[]).tunnel(true).build(&no_lookups()).await.unwrap();
        assert_eq!(section.query_strategy, QueryStrategy::UseIP);
        assert_eq!(
            serde_json::to_value(&section.servers).unwrap(),
            json!(["1.1.1.1", "1.0.0.1", "2606:4700:4700::1111", "2606:4700:4700::1001"])
        );
    }

    #[tokio::test]
    async fn test_remote_resolver_host_pinned() {
        let mut settings = ProxySettings::default();
        settings.dns.remote_dns = "https://dns.google/dns-query".to_string();
        settings.dns.resolved_remote_dns = Some(crate::settings::ResolvedRemoteDns {
            server: "dns.google".to_string(),
            static_ips: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
        });
        let section = DnsBuilder::new(&settings, &["104.16.1.1".to_string()])
            .build(&no_lookups())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(section).unwrap(),
            json!({
                "hosts": {"dns.google": ["8.8.8.8", "8.8.4.4"]},
                "servers": ["https://dns.google/dns-query"],
                "queryStrategy": "UseIP",
                "tag": "dns"
            })
        );
    }

    #[tokio::test]
    async fn test_empty_answer_is_fatal() {
        let settings = ProxySettings::default();
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_| Ok(ResolvedAddrs::default()));
        let result = DnsBuilder::new(&settings, &[])
            .static_target(Some("worker.example.dev"))
            .build(&resolver)
            .await;
        assert!(matches!(result, Err(crate::Error::DnsResolution { .. })));
    }

    #[tokio::test]
    async fn test_ipv6_only_answer_is_fatal_without_ipv6() {
        let mut settings = ProxySettings::default();
        settings.dns.enable_ipv6 = false;
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_| {
            Ok(ResolvedAddrs {
                ipv4: vec![],
                ipv6: vec![Ipv6Addr::LOCALHOST],
            })
        });
        let result = DnsBuilder::new(&settings, &[])
            .static_target(Some("worker.example.dev"))
            .build(&resolver)
            .await;
        assert!(matches!(result, Err(crate::Error::DnsResolution { .. })));
    }

    #[tokio::test]
    async fn test_empty_bootstrap_answer_is_fatal() {
        let settings = ProxySettings::default();
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|domain| {
            if domain == "dash.cloudflare.com" {
                return Ok(ResolvedAddrs::default());
            }
            Ok(ResolvedAddrs {
                ipv4: vec![Ipv4Addr::new(104, 16, 0, 1)],
                ipv6: vec![],
            })
        });
        let result = DnsBuilder::new(&settings, &[]).workerless(true).build(&resolver).await;
        match result {
            Err(crate::Error::DnsResolution { domain, .. }) => assert_eq!(domain, "dash.cloudflare.com"),
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_static_target() {
        let mut settings = ProxySettings::default();
        settings.dns.enable_ipv6 = false;
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .withf(|domain| domain == "worker.example.dev")
            .times(1)
            .returning(|_| {
                Ok(ResolvedAddrs {
                    ipv4: vec![Ipv4Addr::new(104, 21, 0, 1)],
                    ipv6: vec![Ipv6Addr::LOCALHOST],
                })
            });
        let section = DnsBuilder::new(&settings, &[])
            .static_target(Some("worker.example.dev"))
            .build(&resolver)
            .await
            .unwrap();
        assert_eq!(section.hosts.unwrap()["worker.example.dev"], vec!["104.21.0.1"]);
    }

    #[tokio::test]
    async fn test_workerless_bootstrap() {
        let mut settings = ProxySettings::default();
        settings.routing.bypass_china = true;
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().times(3).returning(|domain| {
            let last = domain.len() as u8;
            Ok(ResolvedAddrs {
                ipv4: vec![Ipv4Addr::new(104, 16, 0, last)],
                ipv6: vec![],
            })
        });
        let section = DnsBuilder::new(&settings, &[])
            .workerless(true)
            .build(&resolver)
            .await
            .unwrap();
        assert_eq!(section.hosts.unwrap()["cloudflare-dns.com"].len(), 3);
        assert_eq!(section.servers, vec![DnsServer::Plain(WORKERLESS_DOH.to_string())]);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_fatal() {
        let settings = ProxySettings::default();
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .returning(|domain| Err(crate::Error::resolution(domain, "timed out")));
        let result = DnsBuilder::new(&settings, &[])
            .static_target(Some("worker.example.dev"))
            .build(&resolver)
            .await;
        assert!(result.is_err());
    }
}
