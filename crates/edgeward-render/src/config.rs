//! Logical proxy configuration derived from a snapshot.
//!
//! The structure is proxy-agnostic: one entry per active route with its
//! TLS settings and weighted backends, plus the router-wide listeners and
//! the service-unavailable response. Ordering follows the snapshot's key
//! order, so identical snapshots serialize to identical bytes.

use std::path::PathBuf;

use edgeward_core::{EdgewardConfig, InsecurePolicy};
use edgeward_table::{ActiveRoute, DestinationVerification, Snapshot, TlsMode};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::renderer::PemFile;

/// Router-wide knobs that shape the rendered config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSettings {
    pub stats: StatsListener,
    /// Leave listeners unbound until the initial lists are synced.
    pub bind_ports_after_sync: bool,
}

impl RenderSettings {
    pub fn from_config(config: &EdgewardConfig) -> Self {
        Self {
            stats: StatsListener {
                port: config.stats.port,
                user: config.stats.user.clone(),
                password: config.stats.password.clone(),
            },
            bind_ports_after_sync: config.router.bind_ports_after_sync,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsListener {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Response served when no route matches or the route has no endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl Default for UnavailableResponse {
    fn default() -> Self {
        Self {
            status: 503,
            headers: vec![
                ("Pragma".to_string(), "no-cache".to_string()),
                (
                    "Cache-Control".to_string(),
                    "private, max-age=0, no-cache, no-store".to_string(),
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendConfig {
    /// `namespace/name` of the service.
    pub service: String,
    pub weight: u32,
    /// `address:port` of every endpoint on the preferred port.
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DestinationConfig {
    RouteCa { ca_file: String },
    DefaultCa { ca_file: PathBuf, verify_service_hostname: bool },
    RendererDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteConfig {
    /// Stable identifier of the route inside the proxy config.
    pub routing_key_name: String,
    pub namespace: String,
    pub name: String,
    pub host: String,
    pub path: String,
    pub wildcard: bool,
    pub termination: TlsMode,
    pub insecure_policy: InsecurePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationConfig>,
    pub backends: Vec<BackendConfig>,
    pub serviceable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyConfig {
    pub bind_ports: bool,
    pub stats: StatsListener,
    pub unavailable: UnavailableResponse,
    pub routes: Vec<RouteConfig>,
}

impl ProxyConfig {
    /// Build the config and the PEM files it refers to.
    pub fn from_snapshot(snapshot: &Snapshot, settings: &RenderSettings) -> (Self, Vec<PemFile>) {
        let mut pem_files = Vec::new();
        let routes = snapshot
            .routes()
            .map(|active| route_config(active, &mut pem_files))
            .collect();

        let config = ProxyConfig {
            bind_ports: !settings.bind_ports_after_sync || snapshot.synced(),
            stats: settings.stats.clone(),
            unavailable: UnavailableResponse::default(),
            routes,
        };
        (config, pem_files)
    }
}

fn route_config(active: &ActiveRoute, pem_files: &mut Vec<PemFile>) -> RouteConfig {
    let route = &active.route;
    let key_name = routing_key_name(active.tls.mode, &route.namespace, &route.name);

    let certificate_file = active.tls.certificate.as_ref().map(|material| {
        let mut contents = material.certificate.trim_end().to_string();
        contents.push('\n');
        contents.push_str(material.key.trim_end());
        contents.push('\n');
        if let Some(ca) = &material.ca_certificate {
            contents.push_str(ca.trim_end());
            contents.push('\n');
        }
        let path = format!("certs/{key_name}.pem");
        pem_files.push(PemFile {
            path: path.clone(),
            contents,
        });
        path
    });

    let destination = match &active.tls.destination {
        DestinationVerification::NotApplicable => None,
        DestinationVerification::RouteCa(ca) => {
            let path = format!("cacerts/{key_name}.pem");
            pem_files.push(PemFile {
                path: path.clone(),
                contents: format!("{}\n", ca.trim_end()),
            });
            Some(DestinationConfig::RouteCa { ca_file: path })
        }
        DestinationVerification::DefaultCa { path } => Some(DestinationConfig::DefaultCa {
            ca_file: path.clone(),
            verify_service_hostname: true,
        }),
        DestinationVerification::RendererDefault => Some(DestinationConfig::RendererDefault),
    };

    let backends = active
        .backends
        .iter()
        .map(|backend| BackendConfig {
            service: backend.service.to_string(),
            weight: backend.weight,
            endpoints: backend
                .selected(route.port.as_ref())
                .map(|endpoint| endpoint.socket_address())
                .collect(),
        })
        .collect();

    RouteConfig {
        routing_key_name: key_name,
        namespace: route.namespace.clone(),
        name: route.name.clone(),
        host: active.key.host.clone(),
        path: active.key.path.clone(),
        wildcard: active.key.is_wildcard(),
        termination: active.tls.mode,
        insecure_policy: active.tls.insecure_policy,
        certificate_file,
        destination,
        backends,
        serviceable: active.is_serviceable(),
    }
}

/// Hex SHA-256 of `termination:namespace:name`.
pub fn routing_key_name(mode: TlsMode, namespace: &str, name: &str) -> String {
    let termination = match mode {
        TlsMode::None => "http",
        TlsMode::Edge => "edge",
        TlsMode::Reencrypt => "reencrypt",
        TlsMode::Passthrough => "passthrough",
    };
    hex::encode(Sha256::digest(format!("{termination}:{namespace}:{name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_core::{
        BackendRef, Endpoint, EndpointSet, PortSelector, Route, ServiceId, Termination, TlsConfig,
    };
    use edgeward_table::{EndpointTracker, RoutingTable};
    use crate::fixtures::self_signed;

    fn route(name: &str, host: &str) -> Route {
        Route {
            namespace: "default".to_string(),
            name: name.to_string(),
            host: host.to_string(),
            path: String::new(),
            to: BackendRef::new("web"),
            alternate_backends: Vec::new(),
            port: None,
            tls: None,
            wildcard_policy: Default::default(),
            creation_timestamp: 1,
        }
    }

    fn tracker() -> EndpointTracker {
        let endpoints = EndpointTracker::new();
        endpoints.replace(
            ServiceId::new("default", "web"),
            EndpointSet::new(vec![
                Endpoint::named("10.0.0.1", 8080, "http"),
                Endpoint::named("10.0.0.1", 8443, "https"),
            ]),
        );
        endpoints
    }

    #[test]
    fn routing_key_name_is_stable_and_termination_aware() {
        let plain = routing_key_name(TlsMode::None, "default", "web");
        assert_eq!(plain.len(), 64);
        assert_eq!(plain, routing_key_name(TlsMode::None, "default", "web"));
        assert_ne!(plain, routing_key_name(TlsMode::Edge, "default", "web"));
    }

    #[test]
    fn endpoints_follow_preferred_port() {
        let table = RoutingTable::default();
        let mut r = route("web", "www.example.com");
        r.port = Some(PortSelector::Name("https".to_string()));
        table.upsert(r);

        let (config, pems) = ProxyConfig::from_snapshot(&table.snapshot(&tracker()), &RenderSettings::default());
        assert!(pems.is_empty());
        assert_eq!(config.routes[0].backends[0].endpoints, vec!["10.0.0.1:8443"]);
        assert!(config.routes[0].serviceable);
        assert!(config.bind_ports);
    }

    #[test]
    fn edge_and_reencrypt_emit_pem_files() {
        let table = RoutingTable::default();
        let (cert, key) = self_signed("secure.example.com");
        let (dest, _) = self_signed("backend.example.com");
        let mut tls = TlsConfig::new(Termination::Reencrypt);
        tls.certificate = cert.clone();
        tls.key = key.clone();
        tls.destination_ca_certificate = dest.clone();
        let mut r = route("secure", "secure.example.com");
        r.tls = Some(tls);
        assert!(table.upsert(r).rejection.is_none());

        let (config, pems) = ProxyConfig::from_snapshot(&table.snapshot(&tracker()), &RenderSettings::default());
        let rc = &config.routes[0];
        let key_name = routing_key_name(TlsMode::Reencrypt, "default", "secure");
        assert_eq!(rc.routing_key_name, key_name);
        assert_eq!(rc.certificate_file, Some(format!("certs/{key_name}.pem")));
        assert_eq!(
            rc.destination,
            Some(DestinationConfig::RouteCa {
                ca_file: format!("cacerts/{key_name}.pem")
            })
        );
        assert_eq!(pems.len(), 2);
        assert_eq!(pems[0].contents, format!("{}\n{}\n", cert.trim_end(), key.trim_end()));
        assert_eq!(pems[1].contents, format!("{}\n", dest.trim_end()));
    }

    #[test]
    fn pem_files_are_distinct_per_route() {
        let table = RoutingTable::default();
        for (namespace, name, host) in [("a-b", "c", "one.example.com"), ("a", "b-c", "two.example.com")] {
            let (cert, key) = self_signed(host);
            let mut tls = TlsConfig::new(Termination::Edge);
            tls.certificate = cert;
            tls.key = key;
            let mut r = route(name, host);
            r.namespace = namespace.to_string();
            r.tls = Some(tls);
            assert!(table.upsert(r).rejection.is_none());
        }

        let (config, pems) = ProxyConfig::from_snapshot(&table.snapshot(&tracker()), &RenderSettings::default());
        assert_eq!(pems.len(), 2);
        assert_ne!(pems[0].path, pems[1].path);
        for rc in &config.routes {
            assert_eq!(rc.certificate_file, Some(format!("certs/{}.pem", rc.routing_key_name)));
        }
    }

    #[test]
    fn ports_stay_unbound_until_synced() {
        let settings = RenderSettings {
            bind_ports_after_sync: true,
            ..Default::default()
        };
        let snapshot = RoutingTable::default().snapshot(&EndpointTracker::new());
        let (unsynced, _) = ProxyConfig::from_snapshot(&snapshot, &settings);
        assert!(!unsynced.bind_ports);

        let (synced, _) = ProxyConfig::from_snapshot(&snapshot.with_synced(true), &settings);
        assert!(synced.bind_ports);
    }

    #[test]
    fn unavailable_response_is_uncacheable() {
        let response = UnavailableResponse::default();
        assert_eq!(response.status, 503);
        assert!(response.headers.contains(&("Pragma".to_string(), "no-cache".to_string())));
    }
}
