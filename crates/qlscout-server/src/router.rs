//! Router assembly for the qlscout HTTP API.
//!
//! [`build_router`] wires all handler functions to their routes with
//! CORS and tracing middleware layers.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers;
use crate::settings::Settings;
use crate::state::AppState;

/// Builds the complete axum router with all API routes.
///
/// Routes use axum 0.8 `/{param}` path syntax.
/// TraceLayer provides request-level logging via tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/runs", post(handlers::runs::create_run))
        .route("/api/runs/{id}", get(handlers::runs::get_run))
        .route("/api/runs/{id}/logs", get(handlers::runs::get_logs))
        .route("/api/runs/{id}/results", get(handlers::runs::get_results))
        .route("/api/runs/{id}/cancel", post(handlers::runs::cancel_run))
        .route(
            "/api/runs/{id}/artifacts/{name}",
            get(handlers::runs::get_artifact),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Permissive unless `QLSCOUT_CORS_ORIGINS` names specific origins.
fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.allows_any_origin() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
