//! WireGuard tunnel outbounds

use super::{
    DomainStrategy, NoiseValue, Outbound, OutboundSettings, Protocol, Sockopt, StreamSettings,
    WireGuardPeer, WireGuardSettings,
};
use crate::error::Result;
use crate::fragment::FragmentRange;
use crate::settings::{ClientKind, ProxySettings, TunnelCredentials};

const INTERFACE_V4: &str = "172.16.0.2/32";
const MTU: u16 = 1280;
const KEEP_ALIVE: u32 = 5;

fn noise_value(min: u32, max: u32) -> Result<NoiseValue> {
    if min == max {
        Ok(NoiseValue::Single(min))
    } else {
        FragmentRange::new(min, max).map(NoiseValue::Range)
    }
}

/// Build a WireGuard tunnel to `endpoint`.
///
/// The primary variant is tagged `proxy` and has no stream settings. The
/// chain variant uses the chained account, is tagged `chain` and dials
/// through `proxy`. Noise parameters are only attached to the primary
/// variant for clients that understand them.
pub fn wireguard_tunnel(
    settings: &ProxySettings,
    credentials: &TunnelCredentials,
    endpoint: &str,
    chain: bool,
    client: ClientKind,
) -> Result<Outbound> {
    let account = if chain {
        &credentials.chained
    } else {
        &credentials.primary
    };

    let mut wireguard = WireGuardSettings {
        address: vec![INTERFACE_V4.to_string(), account.ipv6.clone()],
        mtu: MTU,
        peers: vec![WireGuardPeer {
            endpoint: endpoint.to_string(),
            public_key: account.public_key.clone(),
            keep_alive: KEEP_ALIVE,
        }],
        reserved: account.reserved_bytes()?,
        secret_key: account.private_key.clone(),
        wnoise: None,
        wnoisecount: None,
        wpayloadsize: None,
        wnoisedelay: None,
    };

    if !chain && client.supports_noise() {
        let warp = &settings.warp;
        wireguard.wnoise = Some(warp.noise_mode.clone());
        wireguard.wnoisecount = Some(noise_value(warp.noise_count_min, warp.noise_count_max)?);
        wireguard.wpayloadsize = Some(noise_value(warp.noise_size_min, warp.noise_size_max)?);
        wireguard.wnoisedelay = Some(noise_value(warp.noise_delay_min, warp.noise_delay_max)?);
    }

    let stream_settings = chain.then(|| StreamSettings {
        sockopt: Some(Sockopt {
            domain_strategy: Some(DomainStrategy::for_ipv6(settings.dns.warp_enable_ipv6)),
            ..Sockopt::dialer("proxy")
        }),
        ..StreamSettings::default()
    });

    Ok(Outbound {
        tag: if chain { "chain" } else { "proxy" }.to_string(),
        protocol: Protocol::Wireguard,
        settings: Some(OutboundSettings::Wireguard(wireguard)),
        stream_settings,
        mux: None,
    })
}
