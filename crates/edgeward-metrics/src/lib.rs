//! edgeward-metrics: observability for the router control loop.
//!
//! Counts reconciled events and config commits, remembers when the router
//! last committed successfully, and provides Prometheus-compatible text
//! exposition.
//!
//! # Architecture
//!
//! ```text
//! ReloadMetrics
//!   ├── record_event()   ← called by the reconciler per event
//!   ├── record_commit()  ← called by the coalescer per render/activate
//!   └── snapshot() → MetricsSnapshot
//!
//! RouterStatus
//!   ├── mark_*_synced()  ← initial list complete
//!   └── snapshot() → StatusSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;
pub mod status;

pub use collector::{EventOutcome, MetricsSnapshot, ReloadMetrics};
pub use prometheus::render_prometheus;
pub use status::{RouterStatus, StatusSnapshot};
