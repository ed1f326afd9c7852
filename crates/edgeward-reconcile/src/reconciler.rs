//! Event reconciler: the single writer of the routing table.
//!
//! Consumes the route and endpoints streams in delivery order and applies
//! each event to the table or the endpoint tracker. Every event that
//! changes what the proxy should serve marks the dirty signal once;
//! coalescing is the reload coalescer's job.

use std::collections::BTreeSet;

use edgeward_core::{EndpointSet, Endpoints, Route};
use edgeward_metrics::EventOutcome;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::events::{Stream, WatchEvent};
use crate::state::RouterState;

pub struct Reconciler {
    state: RouterState,
    namespaces: Option<BTreeSet<String>>,
}

impl Reconciler {
    pub fn new(state: RouterState) -> Self {
        Self {
            state,
            namespaces: None,
        }
    }

    /// Only admit objects from these namespaces. `None` watches all.
    pub fn with_namespaces(mut self, namespaces: Option<Vec<String>>) -> Self {
        self.namespaces = namespaces.map(|ns| ns.into_iter().collect());
        self
    }

    /// Drop routes and endpoint sets outside the namespace filter.
    /// Returns whether the active routes changed.
    pub fn filter_namespaces(&self) -> bool {
        let Some(namespaces) = &self.namespaces else {
            return false;
        };
        let keep = |ns: &str| namespaces.contains(ns);

        let mut changed = self.state.table.retain_namespaces(keep);
        for service in self.state.endpoints.retain_namespaces(keep) {
            debug!(service = %service, "dropped endpoints outside watched namespaces");
            changed |= self.state.table.references_active(&service);
        }
        if changed {
            self.state.dirty.mark();
        }
        self.update_gauges();
        changed
    }

    fn watches(&self, namespace: &str) -> bool {
        self.namespaces
            .as_ref()
            .is_none_or(|namespaces| namespaces.contains(namespace))
    }

    pub fn apply_route_event(&self, event: WatchEvent<Route>) -> EventOutcome {
        let outcome = match event {
            WatchEvent::Added { object } | WatchEvent::Modified { object } => {
                if !self.watches(&object.namespace) {
                    EventOutcome::Ignored
                } else {
                    let result = self.state.table.upsert(object);
                    if result.changed {
                        self.state.dirty.mark();
                    }
                    match (result.rejection, result.changed) {
                        (Some(_), _) => EventOutcome::Rejected,
                        (None, true) => EventOutcome::Applied,
                        (None, false) => EventOutcome::Ignored,
                    }
                }
            }
            WatchEvent::Deleted { object } => {
                if self.state.table.delete(&object.id()) {
                    self.state.dirty.mark();
                    EventOutcome::Applied
                } else {
                    EventOutcome::Ignored
                }
            }
            WatchEvent::Synced => self.synced(self.state.status.mark_routes_synced()),
        };
        self.state.metrics.record_event(outcome);
        self.update_gauges();
        outcome
    }

    pub fn apply_endpoints_event(&self, event: WatchEvent<Endpoints>) -> EventOutcome {
        let outcome = match event {
            WatchEvent::Added { object } | WatchEvent::Modified { object } => {
                if !self.watches(&object.namespace) {
                    EventOutcome::Ignored
                } else {
                    let service = object.service_id();
                    if self.state.endpoints.replace(service.clone(), EndpointSet::from(object)) {
                        if self.state.table.references_active(&service) {
                            self.state.dirty.mark();
                        }
                        EventOutcome::Applied
                    } else {
                        EventOutcome::Ignored
                    }
                }
            }
            WatchEvent::Deleted { object } => {
                let service = object.service_id();
                if self.state.endpoints.remove(&service) {
                    if self.state.table.references_active(&service) {
                        self.state.dirty.mark();
                    }
                    EventOutcome::Applied
                } else {
                    EventOutcome::Ignored
                }
            }
            WatchEvent::Synced => self.synced(self.state.status.mark_endpoints_synced()),
        };
        self.state.metrics.record_event(outcome);
        outcome
    }

    fn synced(&self, first: bool) -> EventOutcome {
        if first && self.state.status.synced() {
            info!("initial sync complete");
            self.state.dirty.mark();
        }
        if first {
            EventOutcome::Applied
        } else {
            EventOutcome::Ignored
        }
    }

    fn update_gauges(&self) {
        self.state
            .metrics
            .set_route_gauges(self.state.table.active_len(), self.state.table.rejected_len());
    }

    /// Apply events until shutdown. A closed stream is fatal.
    pub async fn run(
        self,
        mut routes: mpsc::Receiver<WatchEvent<Route>>,
        mut endpoints: mpsc::Receiver<WatchEvent<Endpoints>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ReconcileError> {
        info!(namespaces = ?self.namespaces, "reconciler started");
        self.filter_namespaces();

        loop {
            tokio::select! {
                event = routes.recv() => match event {
                    Some(event) => {
                        self.apply_route_event(event);
                    }
                    None => return Err(ReconcileError::StreamClosed(Stream::Routes)),
                },
                event = endpoints.recv() => match event {
                    Some(event) => {
                        self.apply_endpoints_event(event);
                    }
                    None => return Err(ReconcileError::StreamClosed(Stream::Endpoints)),
                },
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_core::{BackendRef, Endpoint};
    use edgeward_table::RoutingTable;

    fn state() -> RouterState {
        RouterState::new(RoutingTable::default())
    }

    fn route(ns: &str, name: &str, host: &str, created: u64) -> Route {
        Route {
            namespace: ns.to_string(),
            name: name.to_string(),
            host: host.to_string(),
            path: String::new(),
            to: BackendRef::new("web"),
            alternate_backends: Vec::new(),
            port: None,
            tls: None,
            wildcard_policy: Default::default(),
            creation_timestamp: created,
        }
    }

    fn endpoints(ns: &str, name: &str, addrs: &[&str]) -> Endpoints {
        Endpoints {
            namespace: ns.to_string(),
            name: name.to_string(),
            endpoints: addrs.iter().map(|a| Endpoint::new(*a, 8080)).collect(),
        }
    }

    #[test]
    fn route_changes_mark_dirty_once() {
        let state = state();
        let reconciler = Reconciler::new(state.clone());

        let r = route("default", "web", "www.example.com", 1);
        assert_eq!(
            reconciler.apply_route_event(WatchEvent::Added { object: r.clone() }),
            EventOutcome::Applied
        );
        assert!(state.dirty.take());

        assert_eq!(
            reconciler.apply_route_event(WatchEvent::Modified { object: r.clone() }),
            EventOutcome::Ignored
        );
        assert!(!state.dirty.take());

        assert_eq!(
            reconciler.apply_route_event(WatchEvent::Deleted { object: r }),
            EventOutcome::Applied
        );
        assert!(state.dirty.take());
    }

    #[test]
    fn shadowed_route_does_not_mark_dirty() {
        let state = state();
        let reconciler = Reconciler::new(state.clone());
        reconciler.apply_route_event(WatchEvent::Added {
            object: route("default", "a", "www.example.com", 1),
        });
        state.dirty.take();

        reconciler.apply_route_event(WatchEvent::Added {
            object: route("default", "b", "www.example.com", 2),
        });
        assert!(!state.dirty.take());
    }

    #[test]
    fn endpoints_only_dirty_when_referenced() {
        let state = state();
        let reconciler = Reconciler::new(state.clone());

        // Nothing routes to "web" yet.
        assert_eq!(
            reconciler.apply_endpoints_event(WatchEvent::Added {
                object: endpoints("default", "web", &["10.0.0.1"]),
            }),
            EventOutcome::Applied
        );
        assert!(!state.dirty.take());

        reconciler.apply_route_event(WatchEvent::Added {
            object: route("default", "web", "www.example.com", 1),
        });
        state.dirty.take();

        // Same set again is a no-op.
        reconciler.apply_endpoints_event(WatchEvent::Modified {
            object: endpoints("default", "web", &["10.0.0.1"]),
        });
        assert!(!state.dirty.take());

        reconciler.apply_endpoints_event(WatchEvent::Modified {
            object: endpoints("default", "web", &["10.0.0.1", "10.0.0.2"]),
        });
        assert!(state.dirty.take());

        reconciler.apply_endpoints_event(WatchEvent::Deleted {
            object: endpoints("default", "web", &[]),
        });
        assert!(state.dirty.take());
        assert!(!state.snapshot().route_for("www.example.com", "/").unwrap().is_serviceable());
    }

    #[test]
    fn rejected_routes_are_counted() {
        let state = state();
        let reconciler = Reconciler::new(state.clone());
        let outcome = reconciler.apply_route_event(WatchEvent::Added {
            object: route("default", "bad", "Not A Host", 1),
        });
        assert_eq!(outcome, EventOutcome::Rejected);
        assert!(!state.dirty.take());

        let metrics = state.metrics.snapshot();
        assert_eq!(metrics.events_rejected, 1);
        assert_eq!(metrics.rejected_routes, 1);
    }

    #[test]
    fn namespace_filter_ignores_and_drops() {
        let state = state();
        Reconciler::new(state.clone()).apply_route_event(WatchEvent::Added {
            object: route("team-b", "web", "b.example.com", 1),
        });
        state.dirty.take();

        let reconciler =
            Reconciler::new(state.clone()).with_namespaces(Some(vec!["team-a".to_string()]));
        assert!(reconciler.filter_namespaces());
        assert!(state.dirty.take());
        assert!(state.table.is_empty());

        assert_eq!(
            reconciler.apply_route_event(WatchEvent::Added {
                object: route("team-b", "web", "b.example.com", 1),
            }),
            EventOutcome::Ignored
        );
        assert_eq!(
            reconciler.apply_route_event(WatchEvent::Added {
                object: route("team-a", "web", "a.example.com", 1),
            }),
            EventOutcome::Applied
        );
    }

    #[test]
    fn sync_markers_mark_dirty_when_both_complete() {
        let state = state();
        let reconciler = Reconciler::new(state.clone());

        reconciler.apply_route_event(WatchEvent::Synced);
        assert!(!state.dirty.take());
        assert_eq!(reconciler.apply_endpoints_event(WatchEvent::Synced), EventOutcome::Applied);
        assert!(state.dirty.take());
        assert!(state.snapshot().synced());

        assert_eq!(reconciler.apply_endpoints_event(WatchEvent::Synced), EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn closed_stream_is_fatal() {
        let state = state();
        let (routes_tx, routes_rx) = mpsc::channel(4);
        let (_endpoints_tx, endpoints_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        routes_tx
            .send(WatchEvent::Added {
                object: route("default", "web", "www.example.com", 1),
            })
            .await
            .unwrap();
        drop(routes_tx);

        let err = Reconciler::new(state.clone())
            .run(routes_rx, endpoints_rx, shutdown_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::StreamClosed(Stream::Routes)));
        assert_eq!(state.table.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let (_routes_tx, routes_rx) = mpsc::channel::<WatchEvent<Route>>(4);
        let (_endpoints_tx, endpoints_rx) = mpsc::channel::<WatchEvent<Endpoints>>(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Reconciler::new(state()).run(routes_rx, endpoints_rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
