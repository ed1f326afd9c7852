use std::path::PathBuf;

use thiserror::Error;

/// Render or activate failure. Always transient from the router's point
/// of view: the pending reload is retried on the next interval.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run reload command {command}: {source}")]
    ReloadSpawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reload command {command} exited with {code:?}: {stderr}")]
    ReloadFailed {
        command: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

impl RenderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderError::Io {
            path: path.into(),
            source,
        }
    }
}
