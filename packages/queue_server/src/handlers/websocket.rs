use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::ws;

/// Queue WebSocket handler - one connection follows one teacher room at a time
pub async fn queue_websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let registry = state.registry.clone();
    let server_config = state.server_config.clone();
    let metrics = state.metrics.clone();

    ws.on_upgrade(move |socket| {
        ws::handle_queue_ws(socket, registry, server_config, Some(metrics))
    })
}
