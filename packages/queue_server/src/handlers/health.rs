use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.snapshot();

    // Dropped room messages mean some viewer needed a resync.
    let status = if metrics.messages.dropped == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        queues: metrics::QueueHealth {
            teachers: state.registry.roster_len() as u64,
            active: state.registry.active_count().await as u64,
        },
        connections: metrics.connections.active,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe - ready once every queue can be reached
pub async fn health_ready_handler(State(state): State<AppState>) -> Response {
    let list = state.registry.list().await;
    let ready = state.registry.roster_len() <= list.len();

    if ready {
        Json(serde_json::json!({
            "status": "ready",
            "teachers": list.len(),
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "teachers": list.len(),
            })),
        )
            .into_response()
    }
}
