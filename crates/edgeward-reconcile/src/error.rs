use edgeward_render::RenderError;
use thiserror::Error;

use crate::events::Stream;

/// Fatal for the control loop.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{0} event stream closed")]
    StreamClosed(Stream),
}

/// A failed commit; the pending reload is retried.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
