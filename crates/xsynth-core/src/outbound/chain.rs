//! Chain-proxy outbounds
//!
//! The chain outbound is tagged `chain` and dials through `proxy`; the
//! orchestrator re-tags and re-links copies of it per variant.

use super::{
    DomainStrategy, GrpcSettings, HttpRequestTemplate, HttpResponseTemplate, Mux, Outbound,
    OutboundSettings, Protocol, ProxyServer, ProxyUser, RealitySettings, RequestHeaders,
    ResponseHeaders, Sockopt, StreamSettings, TcpHeader, TcpSettings, TlsSettings, VlessUser,
    VnextServer, WsHeaders, WsSettings, USER_LEVEL,
};
use crate::chain::{ChainDescriptor, CredentialedUpstream, Security, Transport, VlessUpstream};
use crate::settings::split_list;

fn chain_sockopt(enable_ipv6: bool) -> Sockopt {
    Sockopt {
        tcp_no_delay: Some(true),
        domain_strategy: Some(DomainStrategy::for_ipv6(enable_ipv6)),
        ..Sockopt::dialer("proxy")
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Build the chain outbound for a parsed descriptor
pub fn chain_outbound(descriptor: &ChainDescriptor, enable_ipv6: bool) -> Outbound {
    match descriptor {
        ChainDescriptor::Socks(upstream) => credentialed(Protocol::Socks, upstream, enable_ipv6),
        ChainDescriptor::Http(upstream) => credentialed(Protocol::Http, upstream, enable_ipv6),
        ChainDescriptor::Vless(upstream) => vless(upstream, enable_ipv6),
    }
}

fn credentialed(protocol: Protocol, upstream: &CredentialedUpstream, enable_ipv6: bool) -> Outbound {
    Outbound {
        tag: "chain".to_string(),
        protocol,
        settings: Some(OutboundSettings::Proxy {
            servers: vec![ProxyServer {
                address: upstream.server.clone(),
                port: upstream.port,
                users: vec![ProxyUser {
                    user: upstream.user.clone(),
                    pass: upstream.pass.clone(),
                    level: USER_LEVEL,
                }],
            }],
        }),
        stream_settings: Some(StreamSettings {
            network: Some(Transport::Tcp),
            sockopt: Some(chain_sockopt(enable_ipv6)),
            ..StreamSettings::default()
        }),
        mux: Some(Mux::default()),
    }
}

fn vless(upstream: &VlessUpstream, enable_ipv6: bool) -> Outbound {
    let mut stream = StreamSettings {
        network: Some(upstream.transport),
        security: Some(upstream.security),
        sockopt: Some(chain_sockopt(enable_ipv6)),
        ..StreamSettings::default()
    };
    let mut mux = Some(Mux::default());

    match upstream.security {
        Security::Tls => {
            stream.tls_settings = Some(TlsSettings {
                allow_insecure: false,
                fingerprint: upstream.fp.clone(),
                alpn: split_list(&upstream.alpn),
                server_name: upstream.sni.clone(),
            });
        }
        Security::Reality => {
            mux = None;
            stream.reality_settings = Some(RealitySettings {
                fingerprint: upstream.fp.clone(),
                public_key: upstream.pbk.clone(),
                server_name: upstream.sni.clone(),
                short_id: upstream.sid.clone(),
                spider_x: upstream.spx.clone(),
            });
        }
        Security::None => {}
    }

    if upstream.http_camouflage() {
        stream.tcp_settings = Some(TcpSettings {
            header: TcpHeader::Http {
                request: HttpRequestTemplate {
                    headers: RequestHeaders {
                        host: split_list(&upstream.host),
                    },
                    method: "GET".to_string(),
                    path: split_list(&upstream.path),
                    version: "1.1".to_string(),
                },
                response: HttpResponseTemplate {
                    headers: ResponseHeaders {
                        content_type: vec!["application/octet-stream".to_string()],
                    },
                    reason: "OK".to_string(),
                    status: "200".to_string(),
                    version: "1.1".to_string(),
                },
            },
        });
    }

    match upstream.transport {
        Transport::Tcp if upstream.security != Security::Reality && upstream.header_type.is_empty() => {
            stream.tcp_settings = Some(TcpSettings { header: TcpHeader::None });
        }
        Transport::Tcp => {}
        Transport::Ws => {
            stream.ws_settings = Some(WsSettings {
                headers: WsHeaders {
                    host: upstream.host.clone(),
                    user_agent: None,
                },
                path: upstream.path.clone(),
            });
        }
        Transport::Grpc => {
            mux = None;
            stream.grpc_settings = Some(GrpcSettings {
                authority: upstream.authority.clone(),
                multi_mode: upstream.mode == "multi",
                service_name: upstream.service_name.clone(),
            });
        }
    }

    Outbound {
        tag: "chain".to_string(),
        protocol: Protocol::Vless,
        settings: Some(OutboundSettings::Vnext {
            vnext: vec![VnextServer {
                address: upstream.server.clone(),
                port: upstream.port,
                users: vec![VlessUser {
                    id: upstream.uuid.clone(),
                    encryption: "none".to_string(),
                    flow: non_empty(&upstream.flow),
                    level: USER_LEVEL,
                    security: Some("auto".to_string()),
                }],
            }],
        }),
        stream_settings: Some(stream),
        mux,
    }
}
