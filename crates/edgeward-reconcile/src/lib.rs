//! Edgeward control loop.
//!
//! # Architecture
//!
//! ```text
//! routes stream ────┐
//!                   ├─▶ Reconciler ──mark()──▶ DirtySignal
//! endpoints stream ─┘       │                      │
//!                           ▼                      ▼
//!                  RoutingTable +           ReloadCoalescer
//!                  EndpointTracker ──snapshot──▶ render + activate
//!                                              (at most once per interval)
//! ```

pub mod coalescer;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod state;

pub use coalescer::{DirtySignal, ReloadCoalescer};
pub use error::{CommitError, ReconcileError};
pub use events::{InputEvent, Stream, WatchEvent, pump_json_lines};
pub use reconciler::Reconciler;
pub use state::RouterState;
