use edgeward_core::Termination;
use serde::Serialize;
use thiserror::Error;

/// Why a route was excluded from the active table.
///
/// Rejections are per-object and never stop event processing.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RouteRejection {
    #[error("invalid host {host:?}: {detail}")]
    InvalidHost { host: String, detail: String },

    #[error("invalid path {path:?}: {detail}")]
    InvalidPath { path: String, detail: String },

    #[error("invalid {field} {value:?}: {detail}")]
    InvalidName {
        field: &'static str,
        value: String,
        detail: String,
    },

    #[error("route does not reference a target service")]
    MissingService,

    #[error("backend weight {weight} exceeds the maximum of 256")]
    InvalidWeight { weight: u32 },

    #[error("{termination} termination requires a certificate and key")]
    MissingCertificate { termination: Termination },

    #[error("invalid {field}: {detail}")]
    InvalidCertificate { field: &'static str, detail: String },

    #[error("private key does not match the certificate")]
    KeyMismatch,

    #[error("reencrypt termination requires a destination CA certificate")]
    MissingDestinationCa,

    #[error("passthrough termination cannot route on path {path:?}")]
    PassthroughWithPath { path: String },

    #[error("passthrough termination cannot allow insecure traffic")]
    PassthroughInsecureAllow,

    #[error("host {host:?} is owned by namespace {owner:?}")]
    HostClaimed { host: String, owner: String },
}
