//! Integration tests for document set generation

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use std::net::Ipv4Addr;
use xsynth_core::settings::WarpAccount;
use xsynth_core::{
    ClientKind, ConfigDocument, Deployment, ProxySettings, ResolvedAddrs, Resolver, SettingsPatch,
    SettingsStore, Synthesizer, TunnelCredentials,
};

mock! {
    pub Dns {}

    #[async_trait]
    impl Resolver for Dns {
        async fn resolve(&self, domain: &str) -> xsynth_core::Result<ResolvedAddrs>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl SettingsStore for Store {
        async fn load(&self) -> xsynth_core::Result<ProxySettings>;
        async fn save(&self, patch: SettingsPatch) -> xsynth_core::Result<()>;
    }
}

const SOCKS_CHAIN: &str = r#"{"protocol":"socks","server":"10.20.30.40","port":1080,"user":"u","pass":"p"}"#;

fn resolver() -> MockDns {
    let mut dns = MockDns::new();
    dns.expect_resolve().returning(|_| {
        Ok(ResolvedAddrs {
            ipv4: vec![Ipv4Addr::new(104, 21, 3, 4)],
            ipv6: vec![],
        })
    });
    dns
}

fn quiet_store() -> MockStore {
    let mut store = MockStore::new();
    store.expect_save().never();
    store
}

fn deployment() -> Deployment {
    Deployment::new(
        "worker.example.dev",
        "89b3cbba-e6ac-485a-9481-976a0415eab9",
        "secret",
    )
}

/// One clean IP, VLESS only, port 443
fn single_target() -> ProxySettings {
    let mut settings = ProxySettings::default();
    settings.protocols.trojan = false;
    settings.addresses.include_default_addresses = false;
    settings.addresses.clean_ips = vec!["104.16.1.1".to_string()];
    settings.addresses.ports = vec![443];
    settings
}

fn tags(doc: &ConfigDocument) -> Vec<&str> {
    doc.outbounds.iter().map(|o| o.tag.as_str()).collect()
}

fn value(doc: &ConfigDocument) -> Value {
    serde_json::to_value(doc).unwrap()
}

fn account(reserved: &str) -> WarpAccount {
    WarpAccount {
        ipv6: "2606:4700:110:8a36::1/128".to_string(),
        reserved: reserved.to_string(),
        public_key: "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=".to_string(),
        private_key: "aJeJ7d1kHdJ5oHk6bGgbPvJ6TNbFdA9Di4A0zX6vJ0E=".to_string(),
    }
}

fn credentials() -> TunnelCredentials {
    TunnelCredentials {
        primary: account("AQID"),
        chained: account("BAUG"),
    }
}

// ===== Targeted Documents =====

#[tokio::test]
async fn test_single_target_set() {
    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth
        .targeted_configs(&deployment(), &single_target(), false)
        .await
        .unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].remarks, "💦 1 - VLESS - Clean IP : 443");
    assert_eq!(docs[1].remarks, "💦 Best Ping 💥");

    // dns-in, port 53, catch-all
    assert_eq!(docs[0].routing.rules.len(), 3);
    assert_eq!(tags(&docs[0]), vec!["proxy", "dns-out", "direct", "block"]);

    let json = value(&docs[0]);
    assert_eq!(json["outbounds"][0]["streamSettings"]["security"], "tls");
    assert_eq!(json["outbounds"][0]["settings"]["vnext"][0]["address"], "104.16.1.1");
    assert_eq!(json["routing"]["rules"][2]["outboundTag"], "proxy");
    assert!(json.get("observatory").is_none());
}

#[tokio::test]
async fn test_best_ping_collects_every_target() {
    let mut settings = single_target();
    settings.protocols.trojan = true;
    settings.addresses.ports = vec![443, 80];

    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth.targeted_configs(&deployment(), &settings, false).await.unwrap();

    // 2 protocols x 2 ports x 1 address, plus best ping
    assert_eq!(docs.len(), 5);
    assert_eq!(docs[2].remarks, "💦 1 - Trojan - Clean IP : 443");

    let best = docs.last().unwrap();
    assert_eq!(
        tags(best),
        vec!["prox-1", "prox-2", "prox-3", "prox-4", "dns-out", "direct", "block"]
    );
    let balancers = best.routing.balancers.as_ref().unwrap();
    assert_eq!(balancers[0].fallback_tag.as_deref(), Some("prox-2"));

    let json = value(best);
    assert_eq!(json["outbounds"][1]["streamSettings"]["security"], "none");
    assert_eq!(json["outbounds"][2]["protocol"], "trojan");
}

#[tokio::test]
async fn test_plain_port_skips_tls() {
    let mut settings = single_target();
    settings.addresses.ports = vec![80];

    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth.targeted_configs(&deployment(), &settings, false).await.unwrap();
    let json = value(&docs[0]);
    assert_eq!(json["outbounds"][0]["streamSettings"]["security"], "none");
    assert!(json["outbounds"][0]["streamSettings"].get("tlsSettings").is_none());
}

#[tokio::test]
async fn test_malformed_chain_is_corrected_once() {
    let mut store = MockStore::new();
    store
        .expect_save()
        .withf(|patch| *patch == SettingsPatch::ClearChainProxy)
        .times(1)
        .returning(|_| Ok(()));

    let mut settings = single_target();
    settings.chain.params = Some(r#"{"protocol":"vless","server":"#.to_string());

    let synth = Synthesizer::new(resolver(), store);
    let docs = synth.targeted_configs(&deployment(), &settings, false).await.unwrap();

    let plain = Synthesizer::new(resolver(), quiet_store())
        .targeted_configs(&deployment(), &single_target(), false)
        .await
        .unwrap();

    assert_eq!(docs.len(), plain.len());
    for (doc, expected) in docs.iter().zip(&plain) {
        assert_eq!(doc.remarks, expected.remarks);
        assert_eq!(tags(doc), tags(expected));
        assert_eq!(doc.routing.rules, expected.routing.rules);
        assert!(doc.outbound("chain").is_none());
    }
}

#[tokio::test]
async fn test_chained_targets() {
    let mut settings = single_target();
    settings.chain.params = Some(SOCKS_CHAIN.to_string());

    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth.targeted_configs(&deployment(), &settings, false).await.unwrap();

    assert_eq!(tags(&docs[0]), vec!["chain", "proxy", "dns-out", "direct", "block"]);
    let rules = &docs[0].routing.rules;
    assert_eq!(rules.last().unwrap().outbound_tag(), Some("chain"));
    // remote resolver goes through the stream, everything else through the chain
    assert_eq!(rules[rules.len() - 2].outbound_tag(), Some("proxy"));

    let best = &docs[1];
    assert_eq!(tags(best), vec!["chain-1", "prox-1", "dns-out", "direct", "block"]);
    assert_eq!(best.outbound("chain-1").unwrap().dialer_proxy(), Some("prox-1"));
    let balancers = best.routing.balancers.as_ref().unwrap();
    assert_eq!(balancers[0].tag, "all-proxy");
    assert_eq!(balancers[1].tag, "all");
}

#[tokio::test]
async fn test_fragment_ladder() {
    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth
        .targeted_configs(&deployment(), &single_target(), true)
        .await
        .unwrap();

    assert_eq!(docs.len(), 4);
    let ladder = &docs[2];
    assert_eq!(ladder.remarks, "💦 F - Best Fragment 😎");
    assert_eq!(ladder.outbounds.len(), 36 + 3);
    assert!(ladder.outbound("fragment").is_none());
    assert_eq!(ladder.outbound("prox-18").unwrap().dialer_proxy(), Some("frag-18"));

    let json = value(ladder);
    assert_eq!(json["outbounds"][1]["settings"]["fragment"]["length"], "10-20");
    assert_eq!(json["outbounds"][1]["settings"]["fragment"]["interval"], "1-1");
    assert_eq!(json["outbounds"][35]["settings"]["fragment"]["length"], "100-200");
    assert_eq!(json["dns"]["hosts"]["worker.example.dev"][0], "104.21.3.4");

    let workerless = &docs[3];
    assert_eq!(workerless.remarks, "💦 F - WorkerLess ⭐");
    assert_eq!(tags(workerless).last().copied(), Some("fake-outbound"));
    assert_eq!(
        workerless.routing.rules.last().unwrap().outbound_tag(),
        Some("fragment")
    );
}

#[tokio::test]
async fn test_chained_fragment_ladder() {
    let mut settings = single_target();
    settings.chain.params = Some(SOCKS_CHAIN.to_string());

    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth.targeted_configs(&deployment(), &settings, true).await.unwrap();

    let ladder = &docs[2];
    assert_eq!(ladder.outbounds.len(), 54 + 3);
    assert_eq!(tags(ladder)[..3], ["chain-1", "prox-1", "frag-1"]);
    assert_eq!(ladder.outbound("chain-7").unwrap().dialer_proxy(), Some("prox-7"));
}

#[tokio::test]
async fn test_block_rules_precede_catch_all() {
    let mut settings = single_target();
    settings.routing.bypass_iran = true;
    settings.routing.block_ads = true;
    settings.routing.block_udp443 = true;

    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth.targeted_configs(&deployment(), &settings, false).await.unwrap();
    let json = value(&docs[0]);
    let rules = json["routing"]["rules"].as_array().unwrap();

    let targets: Vec<&str> = rules
        .iter()
        .map(|r| r["outboundTag"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        targets,
        vec!["dns-out", "dns-out", "direct", "direct", "direct", "block", "block", "proxy"]
    );
    assert_eq!(rules[5]["domain"][0], "geosite:category-ads-all");
    assert_eq!(json["dns"]["hosts"]["geosite:category-ads-all"][0], "127.0.0.1");
}

#[tokio::test]
async fn test_resolution_failure_aborts() {
    let mut dns = MockDns::new();
    dns.expect_resolve()
        .returning(|domain| Err(xsynth_core::Error::resolution(domain, "timed out")));

    let mut settings = single_target();
    settings.addresses.include_default_addresses = true;

    let synth = Synthesizer::new(dns, quiet_store());
    let result = synth.targeted_configs(&deployment(), &settings, false).await;
    assert!(matches!(result, Err(xsynth_core::Error::DnsResolution { .. })));
}

fn empty_answers() -> MockDns {
    let mut dns = MockDns::new();
    dns.expect_resolve().returning(|_| Ok(ResolvedAddrs::default()));
    dns
}

#[tokio::test]
async fn test_empty_answer_aborts() {
    let mut settings = single_target();
    settings.addresses.include_default_addresses = true;

    let synth = Synthesizer::new(empty_answers(), quiet_store());
    let result = synth.targeted_configs(&deployment(), &settings, false).await;
    assert!(matches!(result, Err(xsynth_core::Error::DnsResolution { .. })));
}

#[tokio::test]
async fn test_empty_answer_aborts_fragmented_set() {
    let synth = Synthesizer::new(empty_answers(), quiet_store());
    let result = synth.targeted_configs(&deployment(), &single_target(), true).await;
    assert!(matches!(result, Err(xsynth_core::Error::DnsResolution { .. })));
}

#[tokio::test]
async fn test_load_settings_validates() {
    let mut store = MockStore::new();
    store.expect_load().returning(|| {
        let mut settings = ProxySettings::default();
        settings.addresses.ports.clear();
        Ok(settings)
    });

    let synth = Synthesizer::new(resolver(), store);
    assert!(synth.load_settings().await.is_err());
}

// ===== Tunnel Documents =====

#[tokio::test]
async fn test_tunnel_document_order() {
    let mut settings = ProxySettings::default();
    settings.warp.endpoints = vec![
        "engage.cloudflareclient.com:2408".to_string(),
        "162.159.192.1:894".to_string(),
    ];

    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth
        .tunnel_configs(&settings, &credentials(), ClientKind::Xray)
        .await
        .unwrap();

    let remarks: Vec<&str> = docs.iter().map(|d| d.remarks.as_str()).collect();
    assert_eq!(
        remarks,
        vec![
            "💦 1 - Warp 🇮🇷",
            "💦 2 - Warp 🇮🇷",
            "💦 1 - WoW 🌍",
            "💦 2 - WoW 🌍",
            "💦 Warp - Best Ping 🚀",
            "💦 WoW - Best Ping 🚀",
        ]
    );

    assert_eq!(tags(&docs[0]), vec!["proxy", "dns-out", "direct", "block"]);
    assert_eq!(tags(&docs[2]), vec!["chain", "proxy", "dns-out", "direct", "block"]);
    assert_eq!(docs[2].outbound("chain").unwrap().dialer_proxy(), Some("proxy"));

    assert_eq!(tags(&docs[4])[..2], ["prox-1", "prox-2"]);
    assert_eq!(tags(&docs[5])[..4], ["chain-1", "chain-2", "prox-1", "prox-2"]);
    assert_eq!(docs[5].outbound("chain-2").unwrap().dialer_proxy(), Some("prox-2"));

    let balancers = docs[5].routing.balancers.as_ref().unwrap();
    assert!(balancers.iter().all(|b| b.fallback_tag.is_none()));
}

#[tokio::test]
async fn test_tunnel_noise_for_nikang() {
    let settings = ProxySettings::default();
    let synth = Synthesizer::new(resolver(), quiet_store());
    let docs = synth
        .tunnel_configs(&settings, &credentials(), ClientKind::Nikang)
        .await
        .unwrap();

    assert_eq!(docs.len(), 4);
    assert_eq!(docs[0].remarks, "💦 1 - Warp Pro 🇮🇷");

    let warp = value(&docs[0]);
    assert_eq!(warp["outbounds"][0]["settings"]["wnoise"], "quic");
    let wow = value(&docs[1]);
    assert!(wow["outbounds"][0]["settings"].get("wnoise").is_none());
}

#[tokio::test]
async fn test_tunnel_requires_endpoint() {
    let mut settings = ProxySettings::default();
    settings.warp.endpoints.clear();
    let synth = Synthesizer::new(resolver(), quiet_store());
    let result = synth
        .tunnel_configs(&settings, &credentials(), ClientKind::Xray)
        .await;
    assert!(matches!(
        result,
        Err(xsynth_core::Error::SettingsValidation { ref key, .. }) if key == "warp.endpoints"
    ));
}
