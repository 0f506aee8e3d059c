//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::extract::{FromRef, State};
use axum::http::{HeaderName, StatusCode};
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::coordinator::TransactionSettings;
use crate::db;

pub use routes::create_router;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tx_settings: TransactionSettings,
}

impl AppState {
    pub fn new(pool: PgPool, tx_settings: TransactionSettings) -> Self {
        Self { pool, tx_settings }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Build the application router
///
/// Layers run outermost first: request id, trace, logging, auth, handler.
pub fn build_app(state: AppState, permissive_cors: bool) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    let protected_routes = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    let app = Router::new()
        // Health checks (no auth)
        .route("/health", get(health_check))
        .route("/healthz", get(readiness_check))
        .nest("/api/v1", protected_routes)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state);

    if permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe: one database round-trip
async fn readiness_check(State(pool): State<PgPool>) -> (StatusCode, Json<Value>) {
    match db::verify_connection(&pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "database": "ok" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "database": "unreachable" })),
            )
        }
    }
}
