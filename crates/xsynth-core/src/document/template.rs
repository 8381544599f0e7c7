//! Document skeleton assembly
//!
//! A fresh skeleton is built on every call; DNS and rules are left unset
//! for the caller to fill.

use super::{
    Balancer, BalancerStrategy, ConfigDocument, Inbound, LogSection, Observatory, Policy,
    RoutingSection, Stats, PROBE_URL,
};
use crate::error::Result;
use crate::outbound::{
    DomainStrategy, FragmentParams, FreedomSettings, Outbound, OutboundSettings, Protocol, Sockopt,
    StreamSettings,
};
use crate::routing::{BALANCER_ALL, BALANCER_ALL_PROXY};
use crate::settings::ProxySettings;

/// Structural toggles of one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantFlags {
    /// Keep the fragmentation outbound
    pub fragmented: bool,
    /// Add balancer and observatory
    pub balanced: bool,
    /// Chain outbounds are present
    pub chained: bool,
    /// Balancers fall back to the second outbound
    pub fallback: bool,
    /// Tunnel document
    pub tunnel: bool,
}

fn fragment_outbound(settings: &ProxySettings) -> Result<Outbound> {
    let fragment = &settings.fragment;
    Ok(Outbound {
        tag: "fragment".to_string(),
        protocol: Protocol::Freedom,
        settings: Some(OutboundSettings::Freedom(FreedomSettings {
            fragment: Some(FragmentParams {
                packets: fragment.packets.clone(),
                length: fragment.length()?,
                interval: fragment.interval()?,
            }),
            domain_strategy: Some(DomainStrategy::for_ipv6(settings.dns.enable_ipv6)),
        })),
        stream_settings: Some(StreamSettings {
            sockopt: Some(Sockopt {
                tcp_keep_alive_idle: Some(30),
                tcp_no_delay: Some(true),
                ..Sockopt::default()
            }),
            ..StreamSettings::default()
        }),
        mux: None,
    })
}

/// Build a document skeleton labelled `remarks`
pub fn assemble(settings: &ProxySettings, remarks: impl Into<String>, flags: VariantFlags) -> Result<ConfigDocument> {
    let mut inbounds = Inbound::defaults();
    if settings.fake_dns(flags.tunnel) {
        for sniffing in inbounds.iter_mut().filter_map(|inbound| inbound.sniffing.as_mut()) {
            sniffing.dest_override.push("fakedns".to_string());
        }
    }

    let mut outbounds = Vec::with_capacity(4);
    if flags.fragmented {
        outbounds.push(fragment_outbound(settings)?);
    }
    outbounds.extend([Outbound::dns_out(), Outbound::direct(), Outbound::block()]);

    let mut routing = RoutingSection::default();
    let mut observatory = None;

    if flags.balanced {
        let interval = if flags.tunnel {
            settings.probe.best_warp_interval
        } else {
            settings.probe.best_interval
        };
        let mut probe = Observatory {
            probe_interval: format!("{interval}s"),
            probe_url: PROBE_URL.to_string(),
            subject_selector: vec!["prox".to_string()],
            enable_concurrency: true,
        };

        let mut primary = Balancer {
            tag: BALANCER_ALL.to_string(),
            selector: vec!["prox".to_string()],
            strategy: BalancerStrategy::least_ping(),
            fallback_tag: flags.fallback.then(|| "prox-2".to_string()),
        };

        let mut balancers = Vec::with_capacity(2);
        if flags.chained {
            probe.subject_selector.push("chain".to_string());
            let chain = Balancer {
                tag: BALANCER_ALL.to_string(),
                selector: vec!["chain".to_string()],
                strategy: primary.strategy.clone(),
                fallback_tag: flags.fallback.then(|| "chain-2".to_string()),
            };
            primary.tag = BALANCER_ALL_PROXY.to_string();
            balancers.push(primary);
            balancers.push(chain);
        } else {
            balancers.push(primary);
        }

        routing.balancers = Some(balancers);
        observatory = Some(probe);
    }

    Ok(ConfigDocument {
        remarks: remarks.into(),
        log: LogSection::default(),
        dns: None,
        inbounds,
        outbounds,
        policy: Policy::default(),
        routing,
        observatory,
        stats: Stats::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_skeleton() {
        let settings = ProxySettings::default();
        let doc = assemble(&settings, "plain", VariantFlags::default()).unwrap();
        let tags: Vec<&str> = doc.outbounds.iter().map(|o| o.tag.as_str()).collect();
        assert_eq!(tags, vec!["dns-out", "direct", "block"]);
        assert!(doc.observatory.is_none());
        assert!(doc.routing.balancers.is_none());
        assert_eq!(doc.inbounds[0].sniffing.as_ref().unwrap().dest_override, vec!["http", "tls"]);
    }

    #[test]
    fn test_fragment_outbound() {
        let mut settings = ProxySettings::default();
        settings.dns.enable_ipv6 = false;
        let flags = VariantFlags {
            fragmented: true,
            ..VariantFlags::default()
        };
        let doc = assemble(&settings, "fragment", flags).unwrap();
        let value = serde_json::to_value(&doc.outbounds[0]).unwrap();
        assert_eq!(
            value,
            json!({
                "tag": "fragment",
                "protocol": "freedom",
                "settings": {
                    "fragment": {"packets": "tlshello", "length": "100-200", "interval": "1-1"},
                    "domainStrategy": "UseIPv4"
                },
                "streamSettings": {"sockopt": {"tcpKeepAliveIdle": 30, "tcpNoDelay": true}}
            })
        );
    }

    #[test]
    fn test_fake_dns_sniffing() {
        let mut settings = ProxySettings::default();
        settings.dns.warp_fake_dns = true;
        let flags = VariantFlags {
            tunnel: true,
            ..VariantFlags::default()
        };
        let doc = assemble(&settings, "warp", flags).unwrap();
        assert_eq!(doc.inbounds[1].sniffing.as_ref().unwrap().dest_override, vec!["http", "tls", "fakedns"]);
        assert!(doc.inbounds[2].sniffing.is_none());

        let doc = assemble(&settings, "direct", VariantFlags::default()).unwrap();
        assert_eq!(doc.inbounds[0].sniffing.as_ref().unwrap().dest_override.len(), 2);
    }

    #[test]
    fn test_balanced_chained() {
        let mut settings = ProxySettings::default();
        settings.probe.best_warp_interval = 45;
        let flags = VariantFlags {
            balanced: true,
            chained: true,
            fallback: true,
            tunnel: true,
            ..VariantFlags::default()
        };
        let doc = assemble(&settings, "best", flags).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value["routing"]["balancers"],
            json!([
                {"tag": "all-proxy", "selector": ["prox"], "strategy": {"type": "leastPing"}, "fallbackTag": "prox-2"},
                {"tag": "all", "selector": ["chain"], "strategy": {"type": "leastPing"}, "fallbackTag": "chain-2"}
            ])
        );
        assert_eq!(
            value["observatory"],
            json!({
                "probeInterval": "45s",
                "probeURL": "https://www.gstatic.com/generate_204",
                "subjectSelector": ["prox", "chain"],
                "EnableConcurrency": true
            })
        );
    }

    #[test]
    fn test_balanced_without_fallback() {
        let settings = ProxySettings::default();
        let flags = VariantFlags {
            balanced: true,
            ..VariantFlags::default()
        };
        let doc = assemble(&settings, "best", flags).unwrap();
        let balancers = doc.routing.balancers.unwrap();
        assert_eq!(balancers.len(), 1);
        assert_eq!(balancers[0].tag, "all");
        assert!(balancers[0].fallback_tag.is_none());
        assert_eq!(doc.observatory.unwrap().probe_interval, "30s");
    }
}
