//! Edgeward routing table.
//!
//! Keeps the desired routes and the endpoints of the services they point
//! at, decides which route is active for every `(host, path)` key, and
//! produces immutable snapshots for the renderer.
//!
//! # Components
//!
//! - **`table`**: route store with deterministic conflict resolution
//! - **`tls`**: per-route TLS termination policy and validation
//! - **`endpoints`**: service → endpoint set tracker
//! - **`snapshot`**: point-in-time view joined with endpoints
//! - **`admission`**: name, host and path syntax checks
//! - **`pem`**: certificate and key decoding

pub mod admission;
pub mod endpoints;
pub mod error;
pub mod pem;
pub mod snapshot;
pub mod table;
pub mod tls;

pub use endpoints::EndpointTracker;
pub use error::RouteRejection;
pub use snapshot::{ActiveRoute, ResolvedBackend, Resolution, Snapshot, UnavailableReason};
pub use table::{RouteStatus, RoutingTable, UpsertOutcome};
pub use tls::{DestinationVerification, TlsMode, TlsPolicy, TlsResolver};
