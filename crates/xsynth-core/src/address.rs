//! Destination addresses
//!
//! Classification of addresses (domain / IPv4 / IPv6), the per-target
//! [`AddressTarget`] and derivation of the active address pool.

use crate::error::Result;
use crate::resolver::Resolver;
use crate::settings::AddressSettings;
use rand::Rng;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Extra address always offered next to the deployment host
pub const SPEEDTEST_HOST: &str = "www.speedtest.net";

/// What kind of literal an address string is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Fully qualified domain name
    Domain,
    /// IPv4 literal
    Ipv4,
    /// IPv6 literal, bracketed or bare
    Ipv6,
    /// Anything else (CIDR ranges, garbage)
    Other,
}

impl AddressKind {
    /// Classify an address string
    pub fn of(address: &str) -> Self {
        if is_domain(address) {
            return Self::Domain;
        }
        if address.parse::<Ipv4Addr>().is_ok() {
            return Self::Ipv4;
        }
        let bare = address.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<Ipv6Addr>().is_ok() {
            return Self::Ipv6;
        }
        Self::Other
    }
}

/// Returns true when `address` looks like a domain name.
///
/// Labels are 1-63 characters of ASCII alphanumerics or `-`, the first
/// label may not start with `-`, and the last label is at least two
/// ASCII letters.
pub fn is_domain(address: &str) -> bool {
    let labels: Vec<&str> = address.split('.').collect();
    if labels.len() < 2 || address.starts_with('-') {
        return false;
    }

    let (tld, rest) = match labels.split_last() {
        Some(split) => split,
        None => return false,
    };

    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());
    let labels_ok = rest.iter().all(|label| {
        (1..=63).contains(&label.len())
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    tld_ok && labels_ok
}

/// Host part of a `host:port` endpoint. Bracketed IPv6 hosts are unwrapped.
pub fn endpoint_host(endpoint: &str) -> &str {
    if let Some(rest) = endpoint.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match endpoint.rsplit_once(':') {
        Some((host, _port)) => host,
        None => endpoint,
    }
}

/// Randomly flips the case of each letter, used to vary the SNI per document
pub fn random_case(value: &str) -> String {
    let mut rng = rand::thread_rng();
    value
        .chars()
        .map(|c| {
            if rng.gen_bool(0.5) {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// One destination address of a per-target document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTarget {
    /// Domain or IP literal
    pub address: String,
    /// Address comes from the custom CDN list and uses its host/SNI
    pub custom_cdn: bool,
}

impl AddressTarget {
    /// Address served through the deployment host
    pub fn direct(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            custom_cdn: false,
        }
    }

    /// Address served through the custom CDN
    pub fn custom(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            custom_cdn: true,
        }
    }

    /// Kind of the underlying address
    pub fn kind(&self) -> AddressKind {
        AddressKind::of(&self.address)
    }
}

/// Builds the active address list for a request.
///
/// The direct pool is the deployment host, the speedtest host and the
/// host's resolved addresses (when enabled), followed by the clean IPs.
/// Custom CDN addresses are appended unless the request is fragmented.
pub async fn address_pool<R: Resolver + ?Sized>(
    host_name: &str,
    addresses: &AddressSettings,
    enable_ipv6: bool,
    fragmented: bool,
    resolver: &R,
) -> Result<Vec<AddressTarget>> {
    let mut pool = Vec::new();

    if addresses.include_default_addresses {
        let resolved = resolver.resolve(host_name).await?;
        resolved.select(host_name, enable_ipv6)?;
        pool.push(AddressTarget::direct(host_name));
        pool.push(AddressTarget::direct(SPEEDTEST_HOST));
        pool.extend(resolved.ipv4.iter().map(|ip| AddressTarget::direct(ip.to_string())));
        if enable_ipv6 {
            pool.extend(
                resolved
                    .ipv6
                    .iter()
                    .map(|ip| AddressTarget::direct(format!("[{ip}]"))),
            );
        }
    }

    pool.extend(addresses.clean_ips.iter().cloned().map(AddressTarget::direct));

    if !fragmented {
        pool.extend(
            addresses
                .custom_cdn_addrs
                .iter()
                .cloned()
                .map(AddressTarget::custom),
        );
    }

    debug!(count = pool.len(), fragmented, "Resolved address pool");
    Ok(pool)
}
