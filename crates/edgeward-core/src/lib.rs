//! edgeward-core: shared vocabulary for the Edgeward router.
//!
//! Route and endpoint objects as delivered by the control plane, the
//! canonical `(host, path)` route key with its matching rules, and the
//! `edgeward.toml` configuration file.

pub mod config;
pub mod error;
pub mod key;
pub mod types;

pub use config::EdgewardConfig;
pub use error::ConfigError;
pub use key::{Precedence, RouteKey};
pub use types::*;
