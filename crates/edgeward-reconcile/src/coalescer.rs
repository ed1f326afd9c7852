//! Reload coalescer: turns a stream of dirty marks into rate-limited
//! commits.
//!
//! ```text
//! idle ──mark()──▶ waiting ──first mark + interval──▶ committing ──▶ idle
//!                   │  ▲                                  │
//!                   └──┘ further marks absorbed           └─ marked at or after
//!                                                           the deadline: next interval
//! ```
//!
//! A commit takes a snapshot, then renders and activates it on a blocking
//! thread, never under a table lock. A failed commit re-marks the signal,
//! so it is retried one interval later.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use edgeward_render::{Activation, Renderer};
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info};

use crate::error::CommitError;
use crate::state::RouterState;

#[derive(Debug, Default, Clone, Copy)]
struct Marks {
    first: Option<tokio::time::Instant>,
    last: Option<tokio::time::Instant>,
}

#[derive(Default)]
struct DirtyInner {
    marks: Mutex<Marks>,
    notify: Notify,
}

/// "Something changed" flag shared by the reconciler and the coalescer.
#[derive(Clone, Default)]
pub struct DirtySignal {
    inner: Arc<DirtyInner>,
}

impl DirtySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) {
        let now = tokio::time::Instant::now();
        {
            let mut marks = self.inner.marks.lock().expect("dirty signal lock");
            marks.first.get_or_insert(now);
            marks.last = Some(now);
        }
        self.inner.notify.notify_one();
    }

    pub fn is_dirty(&self) -> bool {
        self.marked_at().is_some()
    }

    /// When the oldest pending mark was made.
    pub fn marked_at(&self) -> Option<tokio::time::Instant> {
        self.inner.marks.lock().expect("dirty signal lock").first
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        let mut marks = self.inner.marks.lock().expect("dirty signal lock");
        std::mem::take(&mut *marks).first.is_some()
    }

    /// Clear the marks made before `deadline`, returning whether there
    /// were any. Marks at or after it stay pending and restart the
    /// interval from the latest of them.
    pub fn take_before(&self, deadline: tokio::time::Instant) -> bool {
        let mut marks = self.inner.marks.lock().expect("dirty signal lock");
        match (marks.first, marks.last) {
            (Some(first), _) if first >= deadline => false,
            (Some(_), Some(last)) if last >= deadline => {
                marks.first = Some(last);
                true
            }
            (Some(_), _) => {
                *marks = Marks::default();
                true
            }
            (None, _) => false,
        }
    }

    /// Resolve once the flag is set. Does not clear it.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_dirty() {
                return;
            }
            notified.await;
        }
    }
}

pub struct ReloadCoalescer {
    state: RouterState,
    renderer: Arc<dyn Renderer>,
    interval: Duration,
    commit_on_start: bool,
}

impl ReloadCoalescer {
    pub fn new(state: RouterState, renderer: Arc<dyn Renderer>, interval: Duration) -> Self {
        Self {
            state,
            renderer,
            interval,
            commit_on_start: false,
        }
    }

    /// Commit once immediately at startup, ahead of any dirty mark.
    pub fn with_commit_on_start(mut self, enabled: bool) -> Self {
        self.commit_on_start = enabled;
        self
    }

    /// Render and activate the current snapshot.
    pub async fn commit(&self) -> Result<Activation, CommitError> {
        let snapshot = self.state.snapshot();
        let generation = snapshot.generation();
        let renderer = Arc::clone(&self.renderer);

        let result = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let artifact = renderer.render(&snapshot)?;
            let rendered = started.elapsed();

            let started = Instant::now();
            let activation = renderer.activate(&artifact)?;
            Ok::<_, edgeward_render::RenderError>((artifact.fingerprint, activation, rendered, started.elapsed()))
        })
        .await;

        let (fingerprint, activation, rendered, activated) = match result {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                self.state.metrics.record_failure();
                error!(generation, error = %e, "config commit failed");
                return Err(e.into());
            }
            Err(e) => {
                self.state.metrics.record_failure();
                error!(generation, error = %e, "config commit task failed");
                return Err(e.into());
            }
        };

        let metrics = &self.state.metrics;
        metrics.record_write_config(rendered);
        metrics.record_commit((activation == Activation::Applied).then_some(activated));
        self.state.status.record_commit(&fingerprint);

        info!(
            generation,
            fingerprint = %fingerprint,
            changed = activation == Activation::Applied,
            render_ms = rendered.as_millis() as u64,
            activate_ms = activated.as_millis() as u64,
            "committed router config"
        );
        Ok(activation)
    }

    /// Coalesce dirty marks into commits until shutdown.
    ///
    /// Each commit fires one interval after the first mark it covers.
    ///
    /// A reload still waiting for its interval is abandoned on shutdown; a
    /// commit already running is allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            commit_on_start = self.commit_on_start,
            "reload coalescer started"
        );

        if self.commit_on_start {
            self.state.dirty.take();
            if self.commit().await.is_err() {
                self.state.dirty.mark();
            }
        }

        loop {
            tokio::select! {
                _ = self.state.dirty.wait() => {}
                _ = shutdown.changed() => break,
            }

            let Some(first) = self.state.dirty.marked_at() else {
                continue;
            };
            let deadline = first + self.interval;
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = shutdown.changed() => {
                    debug!("abandoning pending reload");
                    break;
                }
            }

            if !self.state.dirty.take_before(deadline) {
                continue;
            }
            if self.commit().await.is_err() {
                self.state.dirty.mark();
            }
        }

        info!("reload coalescer shutting down");
    }
}
