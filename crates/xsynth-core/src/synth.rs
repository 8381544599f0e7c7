//! Variant generation
//!
//! [`Synthesizer`] turns one settings snapshot into the full document set.
//! Every document is built from a fresh skeleton; outbounds shared between
//! variants are copied with [`Outbound::derive`] before being re-tagged.

use crate::address::{address_pool, endpoint_host, is_domain, random_case};
use crate::chain::ChainDescriptor;
use crate::dns::DnsBuilder;
use crate::document::{assemble, ConfigDocument, VariantFlags};
use crate::error::{Error, Result};
use crate::fragment::{ladder, LADDER_INTERVAL};
use crate::outbound::{
    chain_outbound, tunneled_stream, wireguard_tunnel, workerless_decoy, Outbound, StreamParams,
    StreamProtocol,
};
use crate::remark;
use crate::resolver::Resolver;
use crate::routing::RoutingBuilder;
use crate::settings::{
    ClientKind, Deployment, ProxySettings, SettingsPatch, SettingsStore, TunnelCredentials,
};
use tracing::{debug, info, instrument, warn};

/// Protocols enabled in `settings`, in emission order
pub fn enabled_protocols(settings: &ProxySettings) -> Vec<StreamProtocol> {
    let mut protocols = Vec::with_capacity(2);
    if settings.protocols.vless {
        protocols.push(StreamProtocol::Vless);
    }
    if settings.protocols.trojan {
        protocols.push(StreamProtocol::Trojan);
    }
    protocols
}

/// Document set generator
///
/// Holds the two collaborators the engine consumes: a resolver for static
/// addresses and a settings store for corrections.
pub struct Synthesizer<R, S> {
    resolver: R,
    store: S,
}

impl<R: Resolver, S: SettingsStore> Synthesizer<R, S> {
    /// Create a synthesizer over the given collaborators
    pub fn new(resolver: R, store: S) -> Self {
        Self { resolver, store }
    }

    /// Resolver collaborator
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Settings store collaborator
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load and validate the current settings snapshot
    pub async fn load_settings(&self) -> Result<ProxySettings> {
        let settings = self.store.load().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse the configured chain proxy.
    ///
    /// A malformed descriptor is discarded for this request and a
    /// correction clearing it is written to the store.
    pub async fn chain_proxy(&self, settings: &ProxySettings) -> Option<Outbound> {
        let raw = settings
            .chain
            .params
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())?;

        match ChainDescriptor::parse(raw) {
            Ok(descriptor) => {
                debug!(protocol = descriptor.protocol(), server = descriptor.server(), "Using chain proxy");
                Some(chain_outbound(&descriptor, settings.dns.enable_ipv6))
            }
            Err(err) => {
                warn!(error = %err, "Discarding malformed chain proxy");
                if let Err(err) = self.store.save(SettingsPatch::ClearChainProxy).await {
                    warn!(error = %err, "Failed to persist chain proxy correction");
                }
                None
            }
        }
    }

    /// Per-destination documents, the best-latency aggregate and, when
    /// fragmented, the fragmentation ladder and the platform-restricted
    /// fallback.
    #[instrument(skip(self, deployment, settings), fields(host = %deployment.host_name))]
    pub async fn targeted_configs(
        &self,
        deployment: &Deployment,
        settings: &ProxySettings,
        fragmented: bool,
    ) -> Result<Vec<ConfigDocument>> {
        settings.validate()?;
        deployment.validate()?;

        let chain = self.chain_proxy(settings).await;
        let chained = chain.is_some();
        let enable_ipv6 = settings.dns.enable_ipv6;
        let addresses = &settings.addresses;

        let pool = address_pool(
            &deployment.host_name,
            addresses,
            enable_ipv6,
            fragmented,
            &self.resolver,
        )
        .await?;
        let destinations: Vec<String> = pool.iter().map(|target| target.address.clone()).collect();
        let ports: Vec<u16> = addresses
            .ports
            .iter()
            .copied()
            .filter(|port| !fragmented || deployment.is_https_port(*port))
            .collect();

        let mut documents = Vec::new();
        let mut accumulated: Vec<Outbound> = Vec::new();
        let mut proxy_index = 1usize;

        for protocol in enabled_protocols(settings) {
            let mut protocol_index = 1usize;
            for &port in &ports {
                for target in &pool {
                    let (host, sni) = if target.custom_cdn {
                        (addresses.custom_cdn_host.clone(), addresses.custom_cdn_sni.clone())
                    } else {
                        (deployment.host_name.clone(), random_case(&deployment.host_name))
                    };

                    let label = remark::target_remark(
                        protocol_index,
                        port,
                        target,
                        &addresses.clean_ips,
                        protocol,
                        fragmented,
                    );
                    let flags = VariantFlags {
                        fragmented,
                        chained,
                        ..VariantFlags::default()
                    };
                    let mut document = assemble(settings, label, flags)?;
                    let scope = std::slice::from_ref(&target.address);
                    document.dns = Some(DnsBuilder::new(settings, scope).build(&self.resolver).await?);
                    document.routing.rules = RoutingBuilder::new(settings, scope).chained(chained).build()?;

                    let params = StreamParams {
                        address: &target.address,
                        port,
                        host: &host,
                        sni: &sni,
                        proxy_ip: addresses.proxy_ip.as_deref(),
                        tls: deployment.is_https_port(port),
                        fragmented,
                        allow_insecure: target.custom_cdn,
                        enable_ipv6,
                    };
                    let outbound = tunneled_stream(protocol, "proxy", deployment, &params);

                    let proxy_tag = format!("prox-{proxy_index}");
                    if let Some(chain) = &chain {
                        accumulated.push(chain.derive(format!("chain-{proxy_index}"), Some(proxy_tag.as_str())));
                    }
                    accumulated.push(outbound.derive(proxy_tag, None));

                    let mut head = Vec::with_capacity(2);
                    if let Some(chain) = &chain {
                        head.push(chain.derive("chain", None));
                    }
                    head.push(outbound);
                    document.prepend_outbounds(head);
                    documents.push(document);

                    proxy_index += 1;
                    protocol_index += 1;
                }
            }
        }

        let proxy_count = proxy_index - 1;
        info!(documents = proxy_count, chained, fragmented, "Built per-target documents");

        if proxy_count == 0 {
            warn!("No protocol outbound available, skipping best ping document");
        } else {
            let flags = VariantFlags {
                fragmented,
                balanced: true,
                chained,
                fallback: proxy_count >= 2,
                tunnel: false,
            };
            let mut best_ping = assemble(settings, remark::best_ping(fragmented), flags)?;
            best_ping.dns = Some(DnsBuilder::new(settings, &destinations).build(&self.resolver).await?);
            best_ping.routing.rules = RoutingBuilder::new(settings, &destinations)
                .chained(chained)
                .balanced(true)
                .build()?;
            best_ping.prepend_outbounds(accumulated.iter().cloned());
            documents.push(best_ping);
        }

        if fragmented {
            if let Some(ladder_doc) = self
                .best_fragment(deployment, settings, chain.as_ref(), &accumulated)
                .await?
            {
                documents.push(ladder_doc);
            }
            documents.push(self.workerless(deployment, settings).await?);
        }

        for document in &documents {
            document.check_references()?;
        }
        Ok(documents)
    }

    async fn best_fragment(
        &self,
        deployment: &Deployment,
        settings: &ProxySettings,
        chain: Option<&Outbound>,
        accumulated: &[Outbound],
    ) -> Result<Option<ConfigDocument>> {
        let Some(primary) = accumulated.iter().find(|outbound| outbound.tag.starts_with("prox-")) else {
            warn!("No protocol outbound available, skipping fragment ladder");
            return Ok(None);
        };

        let flags = VariantFlags {
            fragmented: true,
            balanced: true,
            chained: chain.is_some(),
            ..VariantFlags::default()
        };
        let mut document = assemble(settings, remark::best_fragment(), flags)?;
        document.dns = Some(
            DnsBuilder::new(settings, &[])
                .static_target(Some(deployment.host_name.as_str()))
                .build(&self.resolver)
                .await?,
        );
        document.routing.rules = RoutingBuilder::new(settings, &[])
            .chained(chain.is_some())
            .balanced(true)
            .build()?;

        let prototype = document.take_outbound("fragment").ok_or_else(|| Error::DanglingTag {
            document: document.remarks.clone(),
            tag: "fragment".to_string(),
        })?;

        let mut rungs = Vec::new();
        for (index, length) in ladder().enumerate() {
            let n = index + 1;
            let proxy_tag = format!("prox-{n}");
            let fragment_tag = format!("frag-{n}");

            if let Some(chain) = chain {
                rungs.push(chain.derive(format!("chain-{n}"), Some(proxy_tag.as_str())));
            }
            rungs.push(primary.derive(proxy_tag, Some(fragment_tag.as_str())));

            let mut fragment = prototype.derive(fragment_tag, None);
            if let Some(params) = fragment.fragment_mut() {
                params.length = length;
                params.interval = LADDER_INTERVAL;
            }
            rungs.push(fragment);
        }

        debug!(outbounds = rungs.len(), "Built fragment ladder");
        document.prepend_outbounds(rungs);
        Ok(Some(document))
    }

    async fn workerless(&self, deployment: &Deployment, settings: &ProxySettings) -> Result<ConfigDocument> {
        let flags = VariantFlags {
            fragmented: true,
            ..VariantFlags::default()
        };
        let mut document = assemble(settings, remark::workerless(), flags)?;
        document.dns = Some(
            DnsBuilder::new(settings, &[])
                .workerless(true)
                .build(&self.resolver)
                .await?,
        );
        document.routing.rules = RoutingBuilder::new(settings, &[]).workerless(true).build()?;
        document.outbounds.push(workerless_decoy(deployment));
        Ok(document)
    }

    /// Per-endpoint tunnel and tunnel-in-tunnel documents plus their two
    /// best-latency aggregates.
    #[instrument(skip(self, settings, credentials))]
    pub async fn tunnel_configs(
        &self,
        settings: &ProxySettings,
        credentials: &TunnelCredentials,
        client: ClientKind,
    ) -> Result<Vec<ConfigDocument>> {
        settings.validate()?;
        credentials.validate()?;

        let endpoints = &settings.warp.endpoints;
        if endpoints.is_empty() {
            return Err(Error::invalid("warp.endpoints", "at least one endpoint is required"));
        }
        let mut warp_documents = Vec::with_capacity(endpoints.len());
        let mut wow_documents = Vec::with_capacity(endpoints.len());
        let mut warp_outbounds = Vec::with_capacity(endpoints.len());
        let mut wow_outbounds = Vec::with_capacity(endpoints.len());

        for (index, endpoint) in endpoints.iter().enumerate() {
            let n = index + 1;
            let scope = vec![endpoint_host(endpoint).to_string()];

            let warp_flags = VariantFlags {
                tunnel: true,
                ..VariantFlags::default()
            };
            let wow_flags = VariantFlags {
                chained: true,
                ..warp_flags
            };
            let mut warp = assemble(settings, remark::warp(n, client), warp_flags)?;
            let mut wow = assemble(settings, remark::wow(n, client), wow_flags)?;

            let dns = DnsBuilder::new(settings, &scope)
                .tunnel(true)
                .build(&self.resolver)
                .await?;
            wow.dns = Some(dns.clone());
            warp.dns = Some(dns);
            warp.routing.rules = RoutingBuilder::new(settings, &scope).tunnel(true).build()?;
            wow.routing.rules = RoutingBuilder::new(settings, &scope)
                .chained(true)
                .tunnel(true)
                .build()?;

            let warp_outbound = wireguard_tunnel(settings, credentials, endpoint, false, client)?;
            let wow_outbound = wireguard_tunnel(settings, credentials, endpoint, true, client)?;

            let proxy_tag = format!("prox-{n}");
            wow_outbounds.push(wow_outbound.derive(format!("chain-{n}"), Some(proxy_tag.as_str())));
            warp_outbounds.push(warp_outbound.derive(proxy_tag, None));

            wow.prepend_outbounds([wow_outbound, warp_outbound.derive("proxy", None)]);
            warp.prepend_outbounds([warp_outbound]);
            warp_documents.push(warp);
            wow_documents.push(wow);
        }

        let domains: Vec<String> = endpoints
            .iter()
            .map(|endpoint| endpoint_host(endpoint))
            .filter(|host| is_domain(host))
            .map(str::to_string)
            .collect();
        let dns = DnsBuilder::new(settings, &domains)
            .tunnel(true)
            .build(&self.resolver)
            .await?;

        let warp_flags = VariantFlags {
            balanced: true,
            tunnel: true,
            ..VariantFlags::default()
        };
        let mut warp_best = assemble(settings, remark::warp_best_ping(client), warp_flags)?;
        warp_best.dns = Some(dns.clone());
        warp_best.routing.rules = RoutingBuilder::new(settings, &domains)
            .balanced(true)
            .tunnel(true)
            .build()?;
        warp_best.prepend_outbounds(warp_outbounds.iter().cloned());

        let wow_flags = VariantFlags {
            chained: true,
            ..warp_flags
        };
        let mut wow_best = assemble(settings, remark::wow_best_ping(client), wow_flags)?;
        wow_best.dns = Some(dns);
        wow_best.routing.rules = RoutingBuilder::new(settings, &domains)
            .chained(true)
            .balanced(true)
            .tunnel(true)
            .build()?;
        wow_best.prepend_outbounds(wow_outbounds.into_iter().chain(warp_outbounds));

        let mut documents = warp_documents;
        documents.append(&mut wow_documents);
        documents.push(warp_best);
        documents.push(wow_best);

        for document in &documents {
            document.check_references()?;
        }
        info!(documents = documents.len(), %client, "Built tunnel documents");
        Ok(documents)
    }
}
