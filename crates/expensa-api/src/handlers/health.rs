use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> impl IntoResponse {
    Json(json!({ "success": true, "data": { "status": "alive" } }))
}

#[utoipa::path(
    get,
    path = "/api/v1/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unreachable")
    )
)]
pub async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    const TIMEOUT: Duration = Duration::from_secs(5);

    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            Json(json!({ "success": true, "data": { "status": "ready", "database": "not_configured" } })),
        );
    };

    match tokio::time::timeout(TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": { "status": "ready", "database": "ready" } })),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Database readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "Database unavailable",
                    "code": "NOT_READY",
                    "recoverable": true,
                })),
            )
        }
        Err(_) => {
            tracing::error!("Database readiness check timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "Database readiness check timed out",
                    "code": "NOT_READY",
                    "recoverable": true,
                })),
            )
        }
    }
}
