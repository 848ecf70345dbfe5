//! Parent-teacher conference queue server.
//!
//! One authoritative queue per teacher, each owned by its own actor, shared
//! with every viewer of that teacher's room over a WebSocket channel. The
//! [`client`] module holds the viewer side: optimistic promotion with a
//! cancellable confirmation delay, reconnect, and teacher actions.

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod queue_actor;
pub mod queue_registry;
pub mod seed;
pub mod teacher_actions;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::ServerConfig;
use crate::metrics::ServerMetrics;
use crate::queue_registry::QueueRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<QueueRegistry>,
    pub metrics: Arc<ServerMetrics>,
    pub server_config: Arc<ServerConfig>,
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ws", get(handlers::queue_websocket_handler))
        .route("/api/queues", get(handlers::list_queues))
        .route("/api/queues/{teacher_id}", get(handlers::get_queue))
        .route(
            "/api/queues/{teacher_id}/complete",
            post(handlers::complete_current),
        )
        .route("/api/queues/{teacher_id}/skip", post(handlers::skip_current))
        .route(
            "/api/queues/{teacher_id}/entries",
            post(handlers::enqueue_entry),
        )
        .route(
            "/api/queues/{teacher_id}/entries/{entry_id}",
            delete(handlers::remove_entry),
        )
        .route(
            "/api/queues/{teacher_id}/entries/{entry_id}/position",
            get(handlers::entry_position),
        )
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/health/ready", get(handlers::health_ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
}
