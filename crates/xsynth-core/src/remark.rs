//! Document labels

use crate::address::{AddressKind, AddressTarget};
use crate::outbound::StreamProtocol;
use crate::settings::ClientKind;

/// Label of a per-target document, e.g. `💦 3 - VLESS F - IPv4 : 443`
pub fn target_remark(
    index: usize,
    port: u16,
    target: &AddressTarget,
    clean_ips: &[String],
    protocol: StreamProtocol,
    fragmented: bool,
) -> String {
    let variant = if target.custom_cdn {
        " C"
    } else if fragmented {
        " F"
    } else {
        ""
    };
    let kind = if clean_ips.contains(&target.address) {
        "Clean IP"
    } else {
        match target.kind() {
            AddressKind::Domain => "Domain",
            AddressKind::Ipv4 => "IPv4",
            AddressKind::Ipv6 => "IPv6",
            AddressKind::Other => "Address",
        }
    };
    format!("💦 {index} - {protocol}{variant} - {kind} : {port}")
}

/// Label of the best-latency aggregate
pub fn best_ping(fragmented: bool) -> String {
    if fragmented {
        "💦 F - Best Ping 💥".to_string()
    } else {
        "💦 Best Ping 💥".to_string()
    }
}

/// Label of the fragmentation ladder
pub fn best_fragment() -> String {
    "💦 F - Best Fragment 😎".to_string()
}

/// Label of the platform-restricted fallback
pub fn workerless() -> String {
    "💦 F - WorkerLess ⭐".to_string()
}

fn pro(client: ClientKind) -> &'static str {
    if client.supports_noise() {
        " Pro "
    } else {
        " "
    }
}

/// Label of a single-endpoint tunnel document
pub fn warp(index: usize, client: ClientKind) -> String {
    format!("💦 {index} - Warp{}🇮🇷", pro(client))
}

/// Label of a single-endpoint tunnel-in-tunnel document
pub fn wow(index: usize, client: ClientKind) -> String {
    format!("💦 {index} - WoW{}🌍", pro(client))
}

/// Label of the tunnel best-latency aggregate
pub fn warp_best_ping(client: ClientKind) -> String {
    format!("💦 Warp{}- Best Ping 🚀", pro(client))
}

/// Label of the tunnel-in-tunnel best-latency aggregate
pub fn wow_best_ping(client: ClientKind) -> String {
    format!("💦 WoW{}- Best Ping 🚀", pro(client))
}
