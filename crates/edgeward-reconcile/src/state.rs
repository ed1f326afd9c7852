//! Shared router state handed to the reconciler, the coalescer and the API.

use std::sync::Arc;

use edgeward_metrics::{ReloadMetrics, RouterStatus};
use edgeward_table::{EndpointTracker, RoutingTable, Snapshot};

use crate::coalescer::DirtySignal;

#[derive(Clone)]
pub struct RouterState {
    pub table: Arc<RoutingTable>,
    pub endpoints: Arc<EndpointTracker>,
    pub status: Arc<RouterStatus>,
    pub metrics: Arc<ReloadMetrics>,
    pub dirty: DirtySignal,
}

impl RouterState {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table: Arc::new(table),
            endpoints: Arc::new(EndpointTracker::new()),
            status: Arc::new(RouterStatus::new()),
            metrics: Arc::new(ReloadMetrics::new()),
            dirty: DirtySignal::new(),
        }
    }

    /// Current active routes joined with endpoints, tagged with sync state.
    pub fn snapshot(&self) -> Snapshot {
        self.table
            .snapshot(&self.endpoints)
            .with_synced(self.status.synced())
    }
}
