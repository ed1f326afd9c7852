//! Edgeward renderer boundary.
//!
//! Turns a routing [`Snapshot`](edgeward_table::Snapshot) into a logical
//! proxy configuration and activates it. The [`Renderer`] trait is the
//! seam: [`FileRenderer`] writes the configuration to disk and runs a
//! reload command, tests plug in their own implementations.
//!
//! ```text
//! Snapshot ──render()──▶ ConfigArtifact ──activate()──▶ proxy reloaded
//!                         (fingerprinted)               (skipped when the
//!                                                         fingerprint is live)
//! ```

pub mod config;
pub mod error;
pub mod file;
#[cfg(test)]
mod fixtures;
pub mod renderer;

pub use config::{ProxyConfig, RenderSettings, RouteConfig};
pub use error::RenderError;
pub use file::FileRenderer;
pub use renderer::{Activation, ConfigArtifact, PemFile, Renderer};
