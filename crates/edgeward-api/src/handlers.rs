//! API handlers.
//!
//! Every handler reads a fresh snapshot or status copy; none of them
//! touches the table beyond a read lock.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::debug;

use edgeward_core::{InsecurePolicy, RouteId};
use edgeward_metrics::StatusSnapshot;
use edgeward_table::{ActiveRoute, Resolution, RouteRejection, TlsMode, UnavailableReason};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

const NO_CACHE: [(header::HeaderName, &str); 2] = [
    (header::PRAGMA, "no-cache"),
    (header::CACHE_CONTROL, "private, max-age=0, no-cache, no-store"),
];

// ── Views ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BackendView {
    pub service: String,
    pub weight: u32,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RouteView {
    pub id: RouteId,
    pub host: String,
    pub path: String,
    pub wildcard: bool,
    pub termination: TlsMode,
    pub insecure_policy: InsecurePolicy,
    pub serviceable: bool,
    pub backends: Vec<BackendView>,
}

impl From<&ActiveRoute> for RouteView {
    fn from(active: &ActiveRoute) -> Self {
        let port = active.route.port.as_ref();
        Self {
            id: active.id(),
            host: active.key.host.clone(),
            path: active.key.path.clone(),
            wildcard: active.key.is_wildcard(),
            termination: active.tls.mode,
            insecure_policy: active.tls.insecure_policy,
            serviceable: active.is_serviceable(),
            backends: active
                .backends
                .iter()
                .map(|backend| BackendView {
                    service: backend.service.to_string(),
                    weight: backend.weight,
                    endpoints: backend.selected(port).map(|e| e.socket_address()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub status: StatusSnapshot,
    pub synced: bool,
    pub generation: u64,
    pub routes: usize,
    pub active_routes: usize,
    pub rejected_routes: usize,
    pub rejections: Vec<RejectionView>,
}

#[derive(Debug, Serialize)]
pub struct RejectionView {
    pub id: RouteId,
    pub message: String,
    pub reason: RouteRejection,
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    if state.router.status.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no config committed yet")
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let status = state.router.status.snapshot();
    let table = &state.router.table;
    let rejections = table
        .rejections()
        .into_iter()
        .map(|(id, reason)| RejectionView {
            id,
            message: reason.to_string(),
            reason,
        })
        .collect();
    ApiResponse::ok(StatusView {
        synced: status.synced(),
        status,
        generation: table.generation(),
        routes: table.len(),
        active_routes: table.active_len(),
        rejected_routes: table.rejected_len(),
        rejections,
    })
}

// ── Routes ─────────────────────────────────────────────────────

/// GET /api/v1/routes
pub async fn list_routes(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.router.snapshot();
    let routes: Vec<RouteView> = snapshot.routes().map(RouteView::from).collect();
    ApiResponse::ok(routes)
}

/// GET /api/v1/routes/{namespace}/{name}
pub async fn get_route_status(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let id = RouteId::new(namespace, name);
    match state.router.table.route_status(&id) {
        Some(status) => ApiResponse::ok(status).into_response(),
        None => error_response("route not found", StatusCode::NOT_FOUND).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub host: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
struct Unavailable {
    #[serde(flatten)]
    reason: UnavailableReason,
}

/// GET /api/v1/resolve?host=&path=
///
/// Unroutable requests get the same uncacheable 503 the proxy serves.
pub async fn resolve(
    State(state): State<ApiState>,
    Query(query): Query<ResolveQuery>,
) -> impl IntoResponse {
    let path = if query.path.is_empty() { "/" } else { query.path.as_str() };
    let snapshot = state.router.snapshot();
    match snapshot.resolve(&query.host, path) {
        Resolution::Serve(active) => ApiResponse::ok(RouteView::from(active)).into_response(),
        Resolution::Unavailable(reason) => {
            debug!(host = %query.host, path, ?reason, "request unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                NO_CACHE,
                Json(ApiResponse {
                    success: false,
                    data: Some(Unavailable { reason }),
                    error: Some("service unavailable".to_string()),
                }),
            )
                .into_response()
        }
    }
}

// ── Prometheus ─────────────────────────────────────────────────

fn authorized(state: &ApiState, headers: &HeaderMap) -> bool {
    let Some((user, password)) = &state.credentials else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|decoded| {
            decoded
                .split_once(':')
                .map(|(u, p)| u == user && p == password)
        })
        .unwrap_or(false)
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"edgeward\"")],
            "unauthorized",
        )
            .into_response();
    }

    let body = edgeward_metrics::render_prometheus(
        &state.router.metrics.snapshot(),
        &state.router.status.snapshot(),
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
