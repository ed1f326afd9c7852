//! Endpoint tracking: service identity to backend address set.
//!
//! Independent of routing: routes join their endpoints by service
//! reference when a snapshot is taken. Sets are replaced whole behind an
//! `Arc`, so a reader holds either the old set or the new one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use edgeward_core::{EndpointSet, ServiceId};
use tracing::debug;

pub struct EndpointTracker {
    sets: RwLock<HashMap<ServiceId, Arc<EndpointSet>>>,
}

impl EndpointTracker {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Replace a service's endpoint set. Returns whether it changed.
    pub fn replace(&self, service: ServiceId, set: EndpointSet) -> bool {
        let mut sets = self.sets.write().expect("endpoint lock");
        if sets.get(&service).is_some_and(|current| **current == set) {
            debug!(service = %service, "ignoring endpoints update, set unchanged");
            return false;
        }
        debug!(service = %service, count = set.len(), "updated service endpoints");
        sets.insert(service, Arc::new(set));
        true
    }

    /// Forget a service. Returns whether it had a non-empty set.
    pub fn remove(&self, service: &ServiceId) -> bool {
        let mut sets = self.sets.write().expect("endpoint lock");
        match sets.remove(service) {
            Some(set) => {
                debug!(service = %service, "removed service endpoints");
                !set.is_empty()
            }
            None => false,
        }
    }

    /// Current set of a service; empty when it is unknown.
    pub fn get(&self, service: &ServiceId) -> Arc<EndpointSet> {
        let sets = self.sets.read().expect("endpoint lock");
        sets.get(service).cloned().unwrap_or_default()
    }

    /// Drop every service whose namespace fails `keep`. Returns the
    /// dropped services.
    pub fn retain_namespaces(&self, keep: impl Fn(&str) -> bool) -> Vec<ServiceId> {
        let mut sets = self.sets.write().expect("endpoint lock");
        let dropped: Vec<ServiceId> = sets
            .keys()
            .filter(|service| !keep(&service.namespace))
            .cloned()
            .collect();
        for service in &dropped {
            sets.remove(service);
        }
        dropped
    }
}

impl Default for EndpointTracker {
    fn default() -> Self {
        Self::new()
    }
}
