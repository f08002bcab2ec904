//! Liveness probe.

use axum::Json;

use crate::schema::runs::HealthResponse;

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
