//! The renderer seam.

use edgeward_table::Snapshot;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{ProxyConfig, RenderSettings};
use crate::error::RenderError;

/// A PEM file the config refers to, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PemFile {
    pub path: String,
    pub contents: String,
}

/// A rendered configuration, ready to activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    /// Hex SHA-256 over every file the artifact writes.
    pub fingerprint: String,
    pub config: ProxyConfig,
    /// `proxy.json`.
    pub body: Vec<u8>,
    /// `routes.json`: the active routes as received.
    pub state: Vec<u8>,
    pub pem_files: Vec<PemFile>,
}

impl ConfigArtifact {
    pub fn build(snapshot: &Snapshot, settings: &RenderSettings) -> Result<Self, RenderError> {
        let (config, pem_files) = ProxyConfig::from_snapshot(snapshot, settings);
        let body = serde_json::to_vec_pretty(&config)?;
        let routes: Vec<_> = snapshot.routes().map(|active| active.route.as_ref()).collect();
        let state = serde_json::to_vec_pretty(&routes)?;

        let mut hasher = Sha256::new();
        hasher.update(&body);
        hasher.update([0]);
        hasher.update(&state);
        for pem in &pem_files {
            hasher.update(pem.path.as_bytes());
            hasher.update([0]);
            hasher.update(pem.contents.as_bytes());
        }
        let fingerprint = hex::encode(hasher.finalize());

        Ok(Self {
            fingerprint,
            config,
            body,
            state,
            pem_files,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Applied,
    /// The artifact's fingerprint was already live.
    Unchanged,
}

/// Turns snapshots into proxy configuration and makes it live.
///
/// Both calls are synchronous and run off the async runtime. `activate`
/// must be idempotent: activating the live artifact again is a no-op.
pub trait Renderer: Send + Sync {
    fn render(&self, snapshot: &Snapshot) -> Result<ConfigArtifact, RenderError>;

    fn activate(&self, artifact: &ConfigArtifact) -> Result<Activation, RenderError>;
}
