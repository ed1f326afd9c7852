//! Canonical route addressing.
//!
//! A [`RouteKey`] is the `(host, normalized path)` pair two routes must
//! share to conflict. Across different keys on one host the longest
//! matching path wins; within one key the [`Precedence`] order decides.
//!
//! Path matching follows the proxy's prefix semantics:
//!
//! ```text
//! route path ""       matches every request path
//! route path "/a/"    matches request paths starting with "/a/"
//! route path "/a"     matches "/a" and anything under "/a/"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Route, WildcardPolicy};

/// `(host, path)` identity used for conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub host: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(host: &str, path: &str) -> Self {
        Self {
            host: host.to_ascii_lowercase(),
            path: normalize_path(path),
        }
    }

    /// Key a route is stored under. Subdomain wildcard routes key under
    /// `*.<parent domain>` only when the router admits wildcards.
    pub fn for_route(route: &Route, allow_wildcards: bool) -> Self {
        let mut key = RouteKey::new(&route.host, &route.path);
        if allow_wildcards
            && route.wildcard_policy == WildcardPolicy::Subdomain
            && let Some(wildcard) = wildcard_host(&key.host)
        {
            key.host = wildcard;
        }
        key
    }

    pub fn is_wildcard(&self) -> bool {
        self.host.starts_with("*.")
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

/// Conflict order within one key: older creation time first, then the
/// lexicographically smaller `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Precedence {
    pub creation_timestamp: u64,
    pub namespace: String,
    pub name: String,
}

impl Precedence {
    pub fn of(route: &Route) -> Self {
        Self {
            creation_timestamp: route.creation_timestamp,
            namespace: route.namespace.clone(),
            name: route.name.clone(),
        }
    }
}

/// A path made only of `/` is the root and normalizes to "".
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.trim_end_matches('/').is_empty() {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// `www.example.com` → `*.example.com`. Single-label hosts have no parent.
pub fn wildcard_host(host: &str) -> Option<String> {
    let host = host.strip_prefix("*.").unwrap_or(host);
    match host.find('.') {
        Some(idx) if idx > 0 && idx + 1 < host.len() => Some(format!("*.{}", &host[idx + 1..])),
        _ => None,
    }
}

/// Lowercases a request host and strips any `:port` suffix.
pub fn request_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        // IPv6 literal: keep everything up to the closing bracket.
        host.split_once(']')
            .map(|(addr, _)| format!("{addr}]"))
            .unwrap_or_else(|| host.to_string())
    } else {
        host.rsplit_once(':')
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map(|(h, _)| h.to_string())
            .unwrap_or_else(|| host.to_string())
    };
    without_port.to_ascii_lowercase()
}

/// Every route path that could serve `request_path`, longest first and
/// ending with the root "".
pub fn candidate_paths(request_path: &str) -> Vec<String> {
    let path = request_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = normalize_path(candidate);
        if !candidate.is_empty() && !out.iter().any(|c| *c == candidate) {
            out.push(candidate);
        }
    };

    push(path);
    for (idx, _) in path.rmatch_indices('/') {
        if idx == 0 {
            break;
        }
        push(&path[..=idx]);
        push(&path[..idx]);
    }
    out.push(String::new());
    out
}

/// Hosts a request could be served under: exact first, then the wildcard
/// of its parent domain.
pub fn candidate_hosts(host: &str) -> Vec<String> {
    let host = request_host(host);
    let mut out = Vec::with_capacity(2);
    if let Some(wildcard) = wildcard_host(&host) {
        out.push(host);
        out.push(wildcard);
    } else {
        out.push(host);
    }
    out
}

/// Longest-prefix lookup over any keyed store.
///
/// `lookup` is called with each candidate key in priority order and the
/// first hit is returned.
pub fn longest_match<T>(host: &str, path: &str, mut lookup: impl FnMut(&RouteKey) -> Option<T>) -> Option<T> {
    let paths = candidate_paths(path);
    for host in candidate_hosts(host) {
        for path in &paths {
            let key = RouteKey {
                host: host.clone(),
                path: path.clone(),
            };
            if let Some(hit) = lookup(&key) {
                return Some(hit);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendRef;

    fn route(host: &str, path: &str, wildcard: WildcardPolicy) -> Route {
        Route {
            namespace: "ns".to_string(),
            name: "r".to_string(),
            host: host.to_string(),
            path: path.to_string(),
            to: BackendRef::new("svc"),
            alternate_backends: Vec::new(),
            port: None,
            tls: None,
            wildcard_policy: wildcard,
            creation_timestamp: 0,
        }
    }

    #[test]
    fn root_paths_normalize_to_empty() {
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path("//"), "");
        assert_eq!(normalize_path("/test"), "/test");
        assert_eq!(normalize_path("/test/"), "/test/");
    }

    #[test]
    fn candidates_are_longest_first() {
        assert_eq!(
            candidate_paths("/test/foo"),
            vec!["/test/foo", "/test/", "/test", ""]
        );
        assert_eq!(candidate_paths("/test"), vec!["/test", ""]);
        assert_eq!(candidate_paths("/"), vec![""]);
        assert_eq!(candidate_paths(""), vec![""]);
        assert_eq!(candidate_paths("/a/b?x=1"), vec!["/a/b", "/a/", "/a", ""]);
        // Prefixes stop at segment boundaries.
        assert!(!candidate_paths("/testing").contains(&"/test".to_string()));
    }

    #[test]
    fn wildcard_key_only_when_allowed() {
        let r = route("www.example.com", "", WildcardPolicy::Subdomain);
        assert_eq!(RouteKey::for_route(&r, true).host, "*.example.com");
        assert_eq!(RouteKey::for_route(&r, false).host, "www.example.com");

        let plain = route("www.example.com", "", WildcardPolicy::None);
        assert_eq!(RouteKey::for_route(&plain, true).host, "www.example.com");
    }

    #[test]
    fn wildcard_host_needs_a_parent() {
        assert_eq!(wildcard_host("www.example.com").as_deref(), Some("*.example.com"));
        assert_eq!(wildcard_host("localhost"), None);
        assert_eq!(wildcard_host("example."), None);
    }

    #[test]
    fn request_host_strips_port_and_case() {
        assert_eq!(request_host("WWW.Example.com:8080"), "www.example.com");
        assert_eq!(request_host("[fd00::1]:443"), "[fd00::1]");
        assert_eq!(request_host("example.com"), "example.com");
    }

    #[test]
    fn precedence_orders_by_age_then_name() {
        let mut older = route("a.com", "", WildcardPolicy::None);
        older.creation_timestamp = 10;
        older.name = "zzz".to_string();
        let mut newer = route("a.com", "", WildcardPolicy::None);
        newer.creation_timestamp = 20;
        newer.name = "aaa".to_string();
        assert!(Precedence::of(&older) < Precedence::of(&newer));

        let mut tie = older.clone();
        tie.name = "aaa".to_string();
        assert!(Precedence::of(&tie) < Precedence::of(&older));
    }

    #[test]
    fn longest_match_prefers_exact_host() {
        let hit = longest_match("api.example.com", "/v1/users", |key| {
            (key.host == "*.example.com" || (key.host == "api.example.com" && key.path == "/v1"))
                .then(|| key.clone())
        });
        assert_eq!(hit, Some(RouteKey::new("api.example.com", "/v1")));
    }
}
