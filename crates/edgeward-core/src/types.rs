//! Route and endpoint objects as delivered by the control plane.
//!
//! Every watch event carries one of these as a full snapshot of the
//! object, never a diff.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default traffic weight of a backend reference.
pub const DEFAULT_BACKEND_WEIGHT: u32 = 100;

/// Upper bound for backend weights.
pub const MAX_BACKEND_WEIGHT: u32 = 256;

// ── Identity ───────────────────────────────────────────────────────

/// Namespace-scoped identity of a route object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId {
    pub namespace: String,
    pub name: String,
}

impl RouteId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Namespace-scoped identity of a backend service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId {
    pub namespace: String,
    pub name: String,
}

impl ServiceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Route ──────────────────────────────────────────────────────────

/// Desired mapping from `(host, path)` to one or more backend services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub namespace: String,
    pub name: String,
    pub host: String,
    /// Path prefix; empty matches every path on the host.
    #[serde(default)]
    pub path: String,
    /// Primary target service, resolved in the route's namespace.
    pub to: BackendRef,
    /// Additional weighted services sharing the route's traffic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_backends: Vec<BackendRef>,
    /// Which endpoint port to use when a service exposes several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub wildcard_policy: WildcardPolicy,
    /// Unix timestamp (seconds) the object was created at. Immutable.
    pub creation_timestamp: u64,
}

impl Route {
    pub fn id(&self) -> RouteId {
        RouteId::new(&self.namespace, &self.name)
    }

    /// All backend references, primary first.
    pub fn backends(&self) -> impl Iterator<Item = &BackendRef> {
        std::iter::once(&self.to).chain(self.alternate_backends.iter())
    }

    pub fn references(&self, service: &ServiceId) -> bool {
        self.namespace == service.namespace && self.backends().any(|b| b.name == service.name)
    }

    pub fn termination(&self) -> Option<Termination> {
        self.tls.as_ref().map(|tls| tls.termination)
    }
}

/// Weighted reference to a service in the route's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRef {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl BackendRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: DEFAULT_BACKEND_WEIGHT,
        }
    }
}

fn default_weight() -> u32 {
    DEFAULT_BACKEND_WEIGHT
}

/// Selects an endpoint port by name or by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSelector {
    Number(u16),
    Name(String),
}

impl PortSelector {
    /// A named selector also matches the port number spelled as a string.
    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        match self {
            PortSelector::Number(port) => endpoint.port == *port,
            PortSelector::Name(name) => {
                endpoint.port_name.as_deref() == Some(name.as_str())
                    || endpoint.port.to_string() == *name
            }
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Number(port) => write!(f, "{port}"),
            PortSelector::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardPolicy {
    #[default]
    None,
    /// Serve every host in the parent domain of `host`.
    Subdomain,
}

// ── TLS ────────────────────────────────────────────────────────────

/// TLS settings of a route. Absent means plain HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub termination: Termination,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub certificate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_certificate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination_ca_certificate: String,
    #[serde(default)]
    pub insecure_edge_termination_policy: InsecurePolicy,
}

impl TlsConfig {
    pub fn new(termination: Termination) -> Self {
        Self {
            termination,
            certificate: String::new(),
            key: String::new(),
            ca_certificate: String::new(),
            destination_ca_certificate: String::new(),
            insecure_edge_termination_policy: InsecurePolicy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Edge,
    Reencrypt,
    Passthrough,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::Edge => "edge",
            Termination::Reencrypt => "reencrypt",
            Termination::Passthrough => "passthrough",
        })
    }
}

/// What happens to plain-HTTP requests for a TLS route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsecurePolicy {
    /// Rejected.
    #[default]
    None,
    /// Served over plain HTTP.
    Allow,
    /// Redirected to HTTPS.
    Redirect,
}

// ── Endpoints ──────────────────────────────────────────────────────

/// A concrete backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            port_name: None,
        }
    }

    pub fn named(address: impl Into<String>, port: u16, port_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            port_name: Some(port_name.into()),
        }
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn socket_address(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Endpoints object of a service as delivered by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Endpoints {
    pub fn service_id(&self) -> ServiceId {
        ServiceId::new(&self.namespace, &self.name)
    }
}

/// Normalized, ordered endpoint set of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Sorts and deduplicates so equal inputs compare equal regardless of
    /// the order the control plane listed them in.
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        endpoints.sort();
        endpoints.dedup();
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints matching the route's preferred port, or all of them.
    pub fn select<'a>(&'a self, port: Option<&'a PortSelector>) -> impl Iterator<Item = &'a Endpoint> {
        self.endpoints
            .iter()
            .filter(move |e| port.is_none_or(|p| p.matches(e)))
    }
}

impl From<Endpoints> for EndpointSet {
    fn from(value: Endpoints) -> Self {
        EndpointSet::new(value.endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_deserializes_with_defaults() {
        let json = r#"{
            "namespace": "default",
            "name": "web",
            "host": "www.example.com",
            "to": { "name": "frontend" },
            "creation_timestamp": 1000
        }"#;
        let route: Route = serde_json::from_str(json).unwrap();
        assert_eq!(route.path, "");
        assert_eq!(route.to.weight, DEFAULT_BACKEND_WEIGHT);
        assert_eq!(route.wildcard_policy, WildcardPolicy::None);
        assert!(route.tls.is_none());
        assert_eq!(route.id().to_string(), "default/web");
    }

    #[test]
    fn route_references_alternates() {
        let mut route: Route = serde_json::from_str(
            r#"{"namespace":"ns","name":"r","host":"a.com","to":{"name":"s1"},"creation_timestamp":0}"#,
        )
        .unwrap();
        route.alternate_backends.push(BackendRef::new("s2"));

        let backends: Vec<&str> = route.backends().map(|b| b.name.as_str()).collect();
        assert_eq!(backends, vec!["s1", "s2"]);
        assert!(route.references(&ServiceId::new("ns", "s1")));
        assert!(route.references(&ServiceId::new("ns", "s2")));
        assert!(!route.references(&ServiceId::new("other", "s2")));
    }

    #[test]
    fn port_selector_parses_number_or_name() {
        let by_number: PortSelector = serde_json::from_str("8443").unwrap();
        let by_name: PortSelector = serde_json::from_str("\"https\"").unwrap();
        assert_eq!(by_number, PortSelector::Number(8443));
        assert_eq!(by_name, PortSelector::Name("https".to_string()));

        let ep = Endpoint::named("10.0.0.1", 8443, "https");
        assert!(by_number.matches(&ep));
        assert!(by_name.matches(&ep));
        assert!(PortSelector::Name("8443".to_string()).matches(&ep));
        assert!(!PortSelector::Name("http".to_string()).matches(&ep));
    }

    #[test]
    fn endpoint_set_is_order_independent() {
        let a = EndpointSet::new(vec![
            Endpoint::new("10.0.0.2", 80),
            Endpoint::new("10.0.0.1", 80),
            Endpoint::new("10.0.0.1", 80),
        ]);
        let b = EndpointSet::new(vec![
            Endpoint::new("10.0.0.1", 80),
            Endpoint::new("10.0.0.2", 80),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn endpoint_set_filters_by_port() {
        let set = EndpointSet::new(vec![
            Endpoint::named("10.0.0.1", 8080, "http"),
            Endpoint::named("10.0.0.1", 8443, "https"),
        ]);
        let https = PortSelector::Name("https".to_string());
        let selected: Vec<_> = set.select(Some(&https)).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].port, 8443);
        assert_eq!(set.select(None).count(), 2);
    }

    #[test]
    fn ipv6_socket_address_is_bracketed() {
        assert_eq!(Endpoint::new("fd00::1", 80).socket_address(), "[fd00::1]:80");
        assert_eq!(Endpoint::new("10.1.2.3", 80).socket_address(), "10.1.2.3:80");
    }
}
