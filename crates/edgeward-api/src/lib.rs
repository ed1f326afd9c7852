//! edgeward-api: operational HTTP surface of the router.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | 200 once a config has been committed |
//! | GET | `/metrics` | Prometheus exposition, basic auth when configured |
//! | GET | `/api/v1/status` | Readiness, sync state, last commit |
//! | GET | `/api/v1/routes` | Active routes with their backends |
//! | GET | `/api/v1/routes/{namespace}/{name}` | Status of one stored route |
//! | GET | `/api/v1/resolve?host=&path=` | Route serving a request, or 503 |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use edgeward_reconcile::RouterState;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub router: RouterState,
    /// `(user, password)` guarding `/metrics`.
    pub credentials: Option<(String, String)>,
}

impl ApiState {
    pub fn new(router: RouterState) -> Self {
        Self {
            router,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<(&str, &str)>) -> Self {
        self.credentials = credentials.map(|(user, password)| (user.to_string(), password.to_string()));
        self
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/routes", get(handlers::list_routes))
        .route("/routes/{namespace}/{name}", get(handlers::get_route_status))
        .route("/resolve", get(handlers::resolve))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz).with_state(state.clone()))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
