//! Router mode: wires the event input, reconciler, reload coalescer and
//! operational API together.
//!
//! In this mode, the daemon:
//! 1. Builds the routing table from the `[router]` and `[tls]` settings
//! 2. Reads events and fans them into the routes and endpoints streams
//! 3. Reconciles events into the table, marking the router dirty
//! 4. Commits the proxy config at most once per reload interval
//! 5. Serves the operational API until Ctrl-C
//!
//! When the event input ends the control loop stops, but the last
//! committed config stays live and the API keeps serving.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use edgeward_api::{ApiState, build_router};
use edgeward_core::EdgewardConfig;
use edgeward_core::config::parse_duration;
use edgeward_reconcile::{Reconciler, ReloadCoalescer, RouterState, pump_json_lines};
use edgeward_render::{FileRenderer, RenderSettings};
use edgeward_table::{RoutingTable, TlsResolver};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Per-stream channel depth between the input and the reconciler.
const EVENT_BUFFER: usize = 1024;

/// Command-line values that take precedence over the config file.
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub output_dir: Option<PathBuf>,
    pub reload_interval: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut EdgewardConfig) -> anyhow::Result<()> {
        if let Some(listen) = self.listen {
            config.api.listen = listen;
        }
        if let Some(dir) = self.output_dir {
            config.render.output_dir = dir;
        }
        if let Some(interval) = self.reload_interval {
            parse_duration(&interval).context("invalid --reload-interval")?;
            config.router.reload_interval = interval;
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EdgewardConfig> {
    match path {
        Some(path) => EdgewardConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(EdgewardConfig::default()),
    }
}

async fn open_events(source: &str) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("failed to open event input {source}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Run the router until Ctrl-C.
pub async fn run_router(config: EdgewardConfig, events: &str) -> anyhow::Result<()> {
    info!("Edgeward router starting");

    let interval = config.router.reload_interval()?;
    std::fs::create_dir_all(&config.render.output_dir).with_context(|| {
        format!("failed to create {}", config.render.output_dir.display())
    })?;

    // ── Router state ─────────────────────────────────────────────

    let table = RoutingTable::new(TlsResolver::new(config.tls.clone()))
        .with_wildcard_routes(config.router.allow_wildcard_routes)
        .with_namespace_ownership(!config.router.disable_namespace_ownership_check);
    let state = RouterState::new(table);

    let renderer = FileRenderer::new(&config.render.output_dir, RenderSettings::from_config(&config))
        .with_reload_command(config.render.reload_command.clone());
    info!(dir = %config.render.output_dir.display(), "file renderer initialized");

    let coalescer = ReloadCoalescer::new(state.clone(), Arc::new(renderer), interval)
        .with_commit_on_start(config.router.commit_on_start);
    let reconciler =
        Reconciler::new(state.clone()).with_namespaces(config.router.namespaces.clone());

    // ── Shutdown signal ──────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ─────────────────────────────────────────

    let (routes_tx, routes_rx) = mpsc::channel(EVENT_BUFFER);
    let (endpoints_tx, endpoints_rx) = mpsc::channel(EVENT_BUFFER);
    let reader = open_events(events).await?;
    let input_handle = tokio::spawn(async move {
        if let Err(e) = pump_json_lines(reader, routes_tx, endpoints_tx).await {
            error!(error = %e, "event input failed");
        }
    });

    let reconcile_shutdown = shutdown_rx.clone();
    let reconcile_handle = tokio::spawn(async move {
        match reconciler.run(routes_rx, endpoints_rx, reconcile_shutdown).await {
            Ok(()) => {}
            Err(e) => warn!(error = %e, "control loop stopped, last committed config stays live"),
        }
    });

    let coalesce_shutdown = shutdown_rx.clone();
    let coalesce_handle = tokio::spawn(async move {
        coalescer.run(coalesce_shutdown).await;
    });

    // ── API server ───────────────────────────────────────────────

    let api_state = ApiState::new(state).with_credentials(config.stats.credentials());
    let router = build_router(api_state);
    let addr = config.api.listen;

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // The input task may be parked on stdin; it owns nothing that needs
    // flushing.
    input_handle.abort();
    let _ = reconcile_handle.await;
    let _ = coalesce_handle.await;

    info!("Edgeward router stopped");
    Ok(())
}
