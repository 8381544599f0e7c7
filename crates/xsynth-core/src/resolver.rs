//! Static-IP resolution
//!
//! The engine never performs socket-level lookups itself. Anything that
//! needs pinned addresses goes through a [`Resolver`], so tests can inject
//! fixed answers and the production path can use DNS-over-HTTPS.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default DNS-over-HTTPS JSON endpoint
pub const DEFAULT_DOH_URL: &str = "https://cloudflare-dns.com/dns-query";

/// Addresses returned for one domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddrs {
    /// A records
    pub ipv4: Vec<Ipv4Addr>,
    /// AAAA records
    pub ipv6: Vec<Ipv6Addr>,
}

impl ResolvedAddrs {
    /// No address of either family
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// Addresses as strings, IPv6 included only when requested
    pub fn to_strings(&self, with_ipv6: bool) -> Vec<String> {
        let v4 = self.ipv4.iter().map(ToString::to_string);
        if with_ipv6 {
            v4.chain(self.ipv6.iter().map(ToString::to_string)).collect()
        } else {
            v4.collect()
        }
    }

    /// Addresses of the selected families, failing when the answer is empty
    pub fn select(&self, domain: &str, with_ipv6: bool) -> Result<Vec<String>> {
        if self.is_empty() {
            return Err(Error::resolution(domain, "no address in answer"));
        }
        let addrs = self.to_strings(with_ipv6);
        if addrs.is_empty() {
            return Err(Error::resolution(domain, "no IPv4 address in answer"));
        }
        Ok(addrs)
    }
}

/// Resolves a domain to its static addresses
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Look up A and AAAA records for `domain`
    async fn resolve(&self, domain: &str) -> Result<ResolvedAddrs>;
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

#[derive(Deserialize)]
struct DohAnswer {
    data: String,
}

#[derive(Clone, Copy)]
enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }
}

/// DNS-over-HTTPS resolver speaking the `application/dns-json` dialect
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    /// Resolver against [`DEFAULT_DOH_URL`]
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_DOH_URL)
    }

    /// Resolver against a custom endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn query(&self, domain: &str, record: RecordType) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", domain), ("type", record.as_str())])
            .header("accept", "application/dns-json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::resolution(domain, e))?;

        let body: DohResponse = response
            .json()
            .await
            .map_err(|e| Error::resolution(domain, e))?;

        Ok(body
            .answer
            .unwrap_or_default()
            .into_iter()
            .map(|answer| answer.data)
            .collect())
    }
}

#[async_trait]
impl Resolver for DohResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, domain: &str) -> Result<ResolvedAddrs> {
        let (v4, v6) = futures::try_join!(
            self.query(domain, RecordType::A),
            self.query(domain, RecordType::Aaaa)
        )?;

        // CNAME answers carry a name instead of an address
        let resolved = ResolvedAddrs {
            ipv4: v4.iter().filter_map(|data| data.parse().ok()).collect(),
            ipv6: v6.iter().filter_map(|data| data.parse().ok()).collect(),
        };

        debug!(
            ipv4 = resolved.ipv4.len(),
            ipv6 = resolved.ipv6.len(),
            "Resolved static addresses"
        );
        Ok(resolved)
    }
}
