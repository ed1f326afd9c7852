//! Immutable point-in-time view of the active routing table.
//!
//! A snapshot owns `Arc`s to routes and endpoint sets, so it stays valid
//! and unchanged while the table keeps absorbing events.

use std::collections::BTreeMap;
use std::sync::Arc;

use edgeward_core::key::longest_match;
use edgeward_core::{Endpoint, EndpointSet, PortSelector, Route, RouteId, RouteKey, ServiceId};
use serde::Serialize;

use crate::tls::TlsPolicy;

/// One backend of an active route joined with its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBackend {
    pub service: ServiceId,
    pub weight: u32,
    pub endpoints: Arc<EndpointSet>,
}

impl ResolvedBackend {
    pub fn selected<'a>(&'a self, port: Option<&'a PortSelector>) -> impl Iterator<Item = &'a Endpoint> {
        self.endpoints.select(port)
    }
}

/// The winning route of a key.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRoute {
    pub key: RouteKey,
    pub route: Arc<Route>,
    pub tls: TlsPolicy,
    pub backends: Vec<ResolvedBackend>,
}

impl ActiveRoute {
    pub fn id(&self) -> RouteId {
        self.route.id()
    }

    /// Whether any backend that carries traffic has an endpoint on the
    /// preferred port. A lone backend carries traffic whatever its weight.
    pub fn is_serviceable(&self) -> bool {
        let single = self.backends.len() == 1;
        self.backends.iter().any(|backend| {
            (single || backend.weight > 0)
                && backend.selected(self.route.port.as_ref()).next().is_some()
        })
    }
}

/// Outcome of resolving a request against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Serve(&'a ActiveRoute),
    /// Answered with a non-cacheable 503.
    Unavailable(UnavailableReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnavailableReason {
    NoRoute,
    NoEndpoints { route: RouteId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    generation: u64,
    synced: bool,
    routes: BTreeMap<RouteKey, ActiveRoute>,
}

impl Snapshot {
    pub fn new(generation: u64, routes: impl IntoIterator<Item = ActiveRoute>) -> Self {
        Self {
            generation,
            synced: false,
            routes: routes.into_iter().map(|r| (r.key.clone(), r)).collect(),
        }
    }

    /// Mark whether the initial sync with the control plane completed.
    pub fn with_synced(mut self, synced: bool) -> Self {
        self.synced = synced;
        self
    }

    /// Table generation the snapshot was taken at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn synced(&self) -> bool {
        self.synced
    }

    /// Active routes ordered by key.
    pub fn routes(&self) -> impl Iterator<Item = &ActiveRoute> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Longest-prefix lookup of the route serving a request.
    pub fn route_for(&self, host: &str, path: &str) -> Option<&ActiveRoute> {
        longest_match(host, path, |key| self.routes.get(key))
    }

    /// Classify a request: served, or unavailable because nothing matches
    /// or the matching route has no endpoints.
    pub fn resolve(&self, host: &str, path: &str) -> Resolution<'_> {
        match self.route_for(host, path) {
            None => Resolution::Unavailable(UnavailableReason::NoRoute),
            Some(active) if !active.is_serviceable() => {
                Resolution::Unavailable(UnavailableReason::NoEndpoints { route: active.id() })
            }
            Some(active) => Resolution::Serve(active),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_core::BackendRef;

    fn active(host: &str, path: &str, backends: Vec<(u32, Vec<Endpoint>)>) -> ActiveRoute {
        let route = Route {
            namespace: "ns".to_string(),
            name: format!("{host}{path}"),
            host: host.to_string(),
            path: path.to_string(),
            to: BackendRef::new("svc-0"),
            alternate_backends: Vec::new(),
            port: None,
            tls: None,
            wildcard_policy: Default::default(),
            creation_timestamp: 0,
        };
        ActiveRoute {
            key: RouteKey::new(host, path),
            route: Arc::new(route),
            tls: TlsPolicy::plain(),
            backends: backends
                .into_iter()
                .enumerate()
                .map(|(i, (weight, endpoints))| ResolvedBackend {
                    service: ServiceId::new("ns", format!("svc-{i}")),
                    weight,
                    endpoints: Arc::new(EndpointSet::new(endpoints)),
                })
                .collect(),
        }
    }

    #[test]
    fn no_match_is_unavailable() {
        let snapshot = Snapshot::default();
        assert_eq!(
            snapshot.resolve("www.example.com", "/"),
            Resolution::Unavailable(UnavailableReason::NoRoute)
        );
    }

    #[test]
    fn empty_endpoints_are_unavailable() {
        let snapshot = Snapshot::new(1, [active("www.example.com", "", vec![(100, vec![])])]);
        assert!(matches!(
            snapshot.resolve("www.example.com", "/"),
            Resolution::Unavailable(UnavailableReason::NoEndpoints { .. })
        ));
    }

    #[test]
    fn serves_longest_path() {
        let ep = vec![Endpoint::new("10.0.0.1", 80)];
        let snapshot = Snapshot::new(
            1,
            [
                active("www.example.com", "", vec![(100, ep.clone())]),
                active("www.example.com", "/test", vec![(100, ep)]),
            ],
        );
        match snapshot.resolve("www.example.com", "/test/page") {
            Resolution::Serve(route) => assert_eq!(route.key.path, "/test"),
            other => panic!("unexpected {other:?}"),
        }
        match snapshot.resolve("www.example.com", "/other") {
            Resolution::Serve(route) => assert_eq!(route.key.path, ""),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_weight_backends_carry_no_traffic() {
        let ep = vec![Endpoint::new("10.0.0.1", 80)];
        let lone = active("a.example.com", "", vec![(0, ep.clone())]);
        assert!(lone.is_serviceable());

        let split = active("b.example.com", "", vec![(100, vec![]), (0, ep)]);
        assert!(!split.is_serviceable());
    }

    #[test]
    fn preferred_port_filters_endpoints() {
        let mut route = active(
            "a.example.com",
            "",
            vec![(100, vec![Endpoint::named("10.0.0.1", 8080, "http")])],
        );
        let mut inner = (*route.route).clone();
        inner.port = Some(PortSelector::Name("https".to_string()));
        route.route = Arc::new(inner);
        assert!(!route.is_serviceable());
    }
}
