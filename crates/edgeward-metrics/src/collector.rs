//! Reload metrics: counters for events and config commits.
//!
//! Lock-free: every field is an atomic, so the reconciler, the coalescer
//! and the API can share one instance behind an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// What the reconciler did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Changed the desired state.
    Applied,
    /// Replayed, filtered out, or otherwise a no-op.
    Ignored,
    /// Failed validation.
    Rejected,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commits: u64,
    pub reload_failures: u64,
    pub unchanged_activations: u64,
    pub write_config_micros_sum: u64,
    pub write_config_count: u64,
    pub reload_micros_sum: u64,
    pub reload_count: u64,
    pub events_applied: u64,
    pub events_ignored: u64,
    pub events_rejected: u64,
    pub active_routes: u64,
    pub rejected_routes: u64,
}

#[derive(Default)]
pub struct ReloadMetrics {
    commits: AtomicU64,
    reload_failures: AtomicU64,
    unchanged_activations: AtomicU64,
    write_config_micros_sum: AtomicU64,
    write_config_count: AtomicU64,
    reload_micros_sum: AtomicU64,
    reload_count: AtomicU64,
    events_applied: AtomicU64,
    events_ignored: AtomicU64,
    events_rejected: AtomicU64,
    active_routes: AtomicU64,
    rejected_routes: AtomicU64,
}

impl ReloadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, outcome: EventOutcome) {
        let counter = match outcome {
            EventOutcome::Applied => &self.events_applied,
            EventOutcome::Ignored => &self.events_ignored,
            EventOutcome::Rejected => &self.events_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Time spent rendering and writing the config.
    pub fn record_write_config(&self, elapsed: Duration) {
        self.write_config_micros_sum
            .fetch_add(micros(elapsed), Ordering::Relaxed);
        self.write_config_count.fetch_add(1, Ordering::Relaxed);
    }

    /// A successful commit. `reload` is `None` when the artifact was
    /// already active and nothing was reloaded.
    pub fn record_commit(&self, reload: Option<Duration>) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        match reload {
            Some(elapsed) => {
                self.reload_micros_sum
                    .fetch_add(micros(elapsed), Ordering::Relaxed);
                self.reload_count.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.unchanged_activations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_failure(&self) {
        self.reload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_route_gauges(&self, active: usize, rejected: usize) {
        self.active_routes.store(active as u64, Ordering::Relaxed);
        self.rejected_routes.store(rejected as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let snapshot = MetricsSnapshot {
            commits: self.commits.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
            unchanged_activations: self.unchanged_activations.load(Ordering::Relaxed),
            write_config_micros_sum: self.write_config_micros_sum.load(Ordering::Relaxed),
            write_config_count: self.write_config_count.load(Ordering::Relaxed),
            reload_micros_sum: self.reload_micros_sum.load(Ordering::Relaxed),
            reload_count: self.reload_count.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            active_routes: self.active_routes.load(Ordering::Relaxed),
            rejected_routes: self.rejected_routes.load(Ordering::Relaxed),
        };
        debug!(commits = snapshot.commits, failures = snapshot.reload_failures, "metrics snapshot");
        snapshot
    }
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
