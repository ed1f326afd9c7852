//! Router readiness and sync state.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// At least one config commit succeeded.
    pub ready: bool,
    pub routes_synced: bool,
    pub endpoints_synced: bool,
    /// Unix seconds of the last successful commit, if any.
    pub last_commit_epoch: Option<u64>,
    pub commits: u64,
    pub last_fingerprint: Option<String>,
}

impl StatusSnapshot {
    pub fn synced(&self) -> bool {
        self.routes_synced && self.endpoints_synced
    }
}

#[derive(Default)]
pub struct RouterStatus {
    routes_synced: AtomicBool,
    endpoints_synced: AtomicBool,
    last_commit_epoch: AtomicU64,
    commits: AtomicU64,
    last_fingerprint: Mutex<Option<String>>,
}

impl RouterStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time it is called.
    pub fn mark_routes_synced(&self) -> bool {
        let first = !self.routes_synced.swap(true, Ordering::SeqCst);
        if first {
            info!("initial route list synced");
        }
        first
    }

    /// Returns true the first time it is called.
    pub fn mark_endpoints_synced(&self) -> bool {
        let first = !self.endpoints_synced.swap(true, Ordering::SeqCst);
        if first {
            info!("initial endpoints list synced");
        }
        first
    }

    /// Both initial lists have been delivered.
    pub fn synced(&self) -> bool {
        self.routes_synced.load(Ordering::SeqCst) && self.endpoints_synced.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.commits.load(Ordering::SeqCst) > 0
    }

    pub fn record_commit(&self, fingerprint: &str) {
        self.last_commit_epoch.store(epoch_secs(), Ordering::SeqCst);
        self.commits.fetch_add(1, Ordering::SeqCst);
        *self.last_fingerprint.lock().expect("status lock") = Some(fingerprint.to_string());
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let commits = self.commits.load(Ordering::SeqCst);
        StatusSnapshot {
            ready: commits > 0,
            routes_synced: self.routes_synced.load(Ordering::SeqCst),
            endpoints_synced: self.endpoints_synced.load(Ordering::SeqCst),
            last_commit_epoch: (commits > 0).then(|| self.last_commit_epoch.load(Ordering::SeqCst)),
            commits,
            last_fingerprint: self.last_fingerprint.lock().expect("status lock").clone(),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
