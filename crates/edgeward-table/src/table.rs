//! Route store and conflict resolution.
//!
//! Every admitted route is indexed under its [`RouteKey`]. Within a key
//! the route with the smallest [`Precedence`] is active; the others are
//! shadowed and take over when the winner is deleted or becomes invalid.
//! Rejected routes are kept so their status can be reported, but never
//! enter the key index.
//!
//! The active set is a pure function of the current route set: the order
//! in which events arrive never changes which route wins.
//!
//! With namespace ownership enabled, a host and the wildcard subdomain
//! over it belong to the namespace of the oldest valid route claiming
//! them. Claims are granted in precedence order over the whole table, and
//! a route whose claim is refused is reported as rejected without losing
//! its place in the key index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use edgeward_core::key::{longest_match, wildcard_host};
use edgeward_core::{Precedence, Route, RouteId, RouteKey, ServiceId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::admission;
use crate::endpoints::EndpointTracker;
use crate::error::RouteRejection;
use crate::snapshot::{ActiveRoute, ResolvedBackend, Snapshot};
use crate::tls::{TlsMode, TlsPolicy, TlsResolver};

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The active route of some key changed.
    pub changed: bool,
    /// Set when the route failed validation.
    pub rejection: Option<RouteRejection>,
}

/// Where a stored route stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RouteStatus {
    Active,
    Shadowed { by: RouteId },
    Rejected { reason: RouteRejection },
}

struct RouteEntry {
    route: Arc<Route>,
    key: RouteKey,
    precedence: Precedence,
    policy: Result<TlsPolicy, RouteRejection>,
}

#[derive(Default)]
struct TableState {
    routes: HashMap<RouteId, RouteEntry>,
    keys: BTreeMap<RouteKey, BTreeSet<Precedence>>,
    /// Valid routes refused by the namespace ownership check.
    blocked: HashMap<RouteId, RouteRejection>,
    namespace_ownership: bool,
    generation: u64,
}

/// Hosts and subdomains granted so far, by namespace.
#[derive(Default)]
struct HostClaims<'a> {
    hosts: HashMap<String, &'a str>,
    wildcards: HashMap<String, &'a str>,
    domains: HashMap<String, BTreeSet<&'a str>>,
}

impl<'a> HostClaims<'a> {
    fn claim(&mut self, entry: &'a RouteEntry) -> Result<(), RouteRejection> {
        let namespace = entry.route.namespace.as_str();
        let host = entry.route.host.to_ascii_lowercase();
        let domain = wildcard_host(&host);
        let claimed = |host: &str, owner: &str| RouteRejection::HostClaimed {
            host: host.to_string(),
            owner: owner.to_string(),
        };

        if let Some(owner) = self.hosts.get(&host).filter(|owner| **owner != namespace) {
            return Err(claimed(&host, owner));
        }
        if let Some(domain) = &domain {
            if let Some(owner) = self.wildcards.get(domain).filter(|owner| **owner != namespace) {
                return Err(claimed(domain, owner));
            }
            if entry.key.is_wildcard()
                && let Some(owner) = self
                    .domains
                    .get(domain)
                    .and_then(|owners| owners.iter().find(|owner| **owner != namespace))
            {
                return Err(claimed(domain, owner));
            }
        }

        self.hosts.entry(host).or_insert(namespace);
        if let Some(domain) = domain {
            if entry.key.is_wildcard() {
                self.wildcards.entry(domain.clone()).or_insert(namespace);
            }
            self.domains.entry(domain).or_default().insert(namespace);
        }
        Ok(())
    }
}

impl TableState {
    fn winner(&self, key: &RouteKey) -> Option<&RouteEntry> {
        self.keys.get(key)?.iter().find_map(|best| {
            let id = RouteId::new(&best.namespace, &best.name);
            if self.blocked.contains_key(&id) {
                return None;
            }
            self.routes.get(&id)
        })
    }

    fn rejection(&self, id: &RouteId) -> Option<RouteRejection> {
        let entry = self.routes.get(id)?;
        entry.policy.as_ref().err().or_else(|| self.blocked.get(id)).cloned()
    }

    /// Keys whose winners a mutation touching `touched` may change.
    fn observed_keys(&self, touched: &[RouteKey]) -> Vec<RouteKey> {
        let mut keys = touched.to_vec();
        if self.namespace_ownership {
            keys.extend(self.keys.keys().cloned());
        }
        keys
    }

    fn winners(&self, keys: &[RouteKey]) -> Vec<Option<Arc<Route>>> {
        keys.iter().map(|key| self.winner_route(key)).collect()
    }

    /// Re-grant host ownership over every valid route.
    fn recompute_ownership(&mut self) {
        if !self.namespace_ownership {
            return;
        }
        let mut claimants: Vec<&RouteEntry> = self
            .routes
            .values()
            .filter(|entry| entry.policy.is_ok())
            .collect();
        claimants.sort_by(|a, b| a.precedence.cmp(&b.precedence));

        let mut claims = HostClaims::default();
        let blocked: HashMap<RouteId, RouteRejection> = claimants
            .into_iter()
            .filter_map(|entry| claims.claim(entry).err().map(|reason| (entry.route.id(), reason)))
            .collect();
        if blocked.len() != self.blocked.len() {
            debug!(blocked = blocked.len(), "host ownership recomputed");
        }
        self.blocked = blocked;
    }

    fn winner_route(&self, key: &RouteKey) -> Option<Arc<Route>> {
        self.winner(key).map(|entry| entry.route.clone())
    }

    fn detach(&mut self, id: &RouteId) -> Option<RouteEntry> {
        let entry = self.routes.remove(id)?;
        if let Some(set) = self.keys.get_mut(&entry.key) {
            set.remove(&entry.precedence);
            if set.is_empty() {
                self.keys.remove(&entry.key);
            }
        }
        Some(entry)
    }

    fn attach(&mut self, id: RouteId, entry: RouteEntry) {
        if entry.policy.is_ok() {
            self.keys
                .entry(entry.key.clone())
                .or_default()
                .insert(entry.precedence.clone());
        }
        self.routes.insert(id, entry);
    }

    fn remove_route(&mut self, id: &RouteId) -> bool {
        let Some(key) = self.routes.get(id).map(|entry| entry.key.clone()) else {
            return false;
        };
        let observed = self.observed_keys(std::slice::from_ref(&key));
        let before = self.winners(&observed);
        self.detach(id);
        self.recompute_ownership();
        let after = self.winners(&observed);
        let changed = before != after;
        if changed {
            self.generation += 1;
            if let Some(promoted) = self.winner_route(&key) {
                info!(key = %key, route = %promoted.id(), "promoted next route after removal");
            }
        }
        changed
    }
}

pub struct RoutingTable {
    state: RwLock<TableState>,
    tls: TlsResolver,
    allow_wildcard_routes: bool,
}

impl RoutingTable {
    pub fn new(tls: TlsResolver) -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            tls,
            allow_wildcard_routes: false,
        }
    }

    /// Key subdomain-wildcard routes under `*.<parent>` instead of their
    /// literal host.
    pub fn with_wildcard_routes(mut self, allow: bool) -> Self {
        self.allow_wildcard_routes = allow;
        self
    }

    /// Refuse routes whose host, or whose wildcard subdomain, is already
    /// claimed by an older route from another namespace.
    pub fn with_namespace_ownership(self, enabled: bool) -> Self {
        self.state.write().expect("routing table lock").namespace_ownership = enabled;
        self
    }

    /// Insert or replace a route by identity.
    ///
    /// The stored creation timestamp is immutable: an update carrying a
    /// different one keeps the original. Replaying an identical route is
    /// a no-op.
    pub fn upsert(&self, mut route: Route) -> UpsertOutcome {
        let id = route.id();
        let mut state = self.state.write().expect("routing table lock");

        let mut previous_key = None;
        let mut previous_mode = None;
        if let Some(existing) = state.routes.get(&id) {
            if existing.route.creation_timestamp != route.creation_timestamp {
                warn!(
                    route = %id,
                    stored = existing.route.creation_timestamp,
                    received = route.creation_timestamp,
                    "creation timestamp changed on update, keeping stored value"
                );
                route.creation_timestamp = existing.route.creation_timestamp;
            }
            if *existing.route == route {
                debug!(route = %id, "ignoring unchanged route");
                return UpsertOutcome {
                    changed: false,
                    rejection: state.rejection(&id),
                };
            }
            previous_key = Some(existing.key.clone());
            previous_mode = Some(TlsMode::from(existing.route.termination()));
        }

        let policy = admission::admit(&route).and_then(|()| self.tls.transition(previous_mode, &route));
        let key = RouteKey::for_route(&route, self.allow_wildcard_routes);
        let precedence = Precedence::of(&route);

        let mut affected = vec![key.clone()];
        if let Some(previous) = previous_key
            && previous != key
        {
            affected.push(previous);
        }
        let observed = state.observed_keys(&affected);
        let before = state.winners(&observed);

        state.detach(&id);
        state.attach(
            id.clone(),
            RouteEntry {
                route: Arc::new(route),
                key: key.clone(),
                precedence,
                policy,
            },
        );
        state.recompute_ownership();

        let rejection = state.rejection(&id);
        let after = state.winners(&observed);
        let changed = before != after;
        if changed {
            state.generation += 1;
        }

        match &rejection {
            Some(reason) => warn!(route = %id, key = %key, %reason, "route rejected"),
            None if changed => debug!(route = %id, key = %key, "route upserted"),
            None => {
                if let Some(winner) = state.winner(&key).filter(|w| w.route.id() != id) {
                    debug!(route = %id, key = %key, by = %winner.route.id(), "route shadowed");
                }
            }
        }

        UpsertOutcome { changed, rejection }
    }

    /// Remove a route. Returns whether the active set changed.
    pub fn delete(&self, id: &RouteId) -> bool {
        let mut state = self.state.write().expect("routing table lock");
        let changed = state.remove_route(id);
        debug!(route = %id, changed, "route deleted");
        changed
    }

    /// Drop every route whose namespace fails `keep`. Returns whether the
    /// active set changed.
    pub fn retain_namespaces(&self, keep: impl Fn(&str) -> bool) -> bool {
        let mut state = self.state.write().expect("routing table lock");
        let dropped: Vec<RouteId> = state
            .routes
            .keys()
            .filter(|id| !keep(&id.namespace))
            .cloned()
            .collect();
        let mut changed = false;
        for id in &dropped {
            changed |= state.remove_route(id);
        }
        if !dropped.is_empty() {
            info!(count = dropped.len(), "dropped routes outside watched namespaces");
        }
        changed
    }

    /// Active route serving a request, by longest path then wildcard host.
    pub fn active_route_for(&self, host: &str, path: &str) -> Option<Arc<Route>> {
        let state = self.state.read().expect("routing table lock");
        longest_match(host, path, |key| state.winner_route(key))
    }

    pub fn route_status(&self, id: &RouteId) -> Option<RouteStatus> {
        let state = self.state.read().expect("routing table lock");
        let entry = state.routes.get(id)?;
        if let Some(reason) = state.rejection(id) {
            return Some(RouteStatus::Rejected { reason });
        }
        match state.winner(&entry.key) {
            Some(winner) if winner.route.id() != *id => Some(RouteStatus::Shadowed {
                by: winner.route.id(),
            }),
            _ => Some(RouteStatus::Active),
        }
    }

    /// Rejected routes with their reasons, sorted by identity.
    pub fn rejections(&self) -> Vec<(RouteId, RouteRejection)> {
        let state = self.state.read().expect("routing table lock");
        let mut out: Vec<(RouteId, RouteRejection)> = state
            .routes
            .keys()
            .filter_map(|id| state.rejection(id).map(|reason| (id.clone(), reason)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Whether any active route sends traffic to `service`.
    pub fn references_active(&self, service: &ServiceId) -> bool {
        let state = self.state.read().expect("routing table lock");
        state
            .keys
            .keys()
            .filter_map(|key| state.winner(key))
            .any(|entry| entry.route.references(service))
    }

    /// Number of stored routes, rejected and shadowed included.
    pub fn len(&self) -> usize {
        self.state.read().expect("routing table lock").routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with an active route.
    pub fn active_len(&self) -> usize {
        let state = self.state.read().expect("routing table lock");
        state.keys.keys().filter(|key| state.winner(key).is_some()).count()
    }

    pub fn rejected_len(&self) -> usize {
        let state = self.state.read().expect("routing table lock");
        state
            .routes
            .iter()
            .filter(|(id, entry)| entry.policy.is_err() || state.blocked.contains_key(*id))
            .count()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().expect("routing table lock").generation
    }

    /// Immutable view of the active routes joined with their endpoints.
    pub fn snapshot(&self, endpoints: &EndpointTracker) -> Snapshot {
        let state = self.state.read().expect("routing table lock");
        let active = state.keys.keys().filter_map(|key| {
            let entry = state.winner(key)?;
            let policy = entry.policy.as_ref().ok()?;
            let backends = entry
                .route
                .backends()
                .map(|backend| {
                    let service = ServiceId::new(&entry.route.namespace, &backend.name);
                    ResolvedBackend {
                        endpoints: endpoints.get(&service),
                        service,
                        weight: backend.weight,
                    }
                })
                .collect();
            Some(ActiveRoute {
                key: key.clone(),
                route: entry.route.clone(),
                tls: policy.clone(),
                backends,
            })
        });
        Snapshot::new(state.generation, active)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(TlsResolver::default())
    }
}
