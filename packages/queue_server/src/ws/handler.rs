//! WebSocket Handler
//!
//! One connection per viewer. Incoming client messages go through the
//! dispatcher; outgoing messages (direct replies and room broadcasts) share a
//! single bounded channel drained by the sender task.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::metrics::ServerMetrics;
use crate::queue_registry::QueueRegistry;

use super::dispatch::{ConnectionContext, dispatch_client_message};
use super::protocol::{ClientMessage, ServerMessage};

pub async fn handle_queue_ws(
    socket: WebSocket,
    registry: Arc<QueueRegistry>,
    server_config: Arc<ServerConfig>,
    server_metrics: Option<Arc<ServerMetrics>>,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "New queue WebSocket connection");

    if let Some(ref m) = server_metrics {
        m.connection_opened();
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(server_config.send_channel_capacity);

    let ctx = ConnectionContext::new(
        connection_id.clone(),
        tx.clone(),
        registry,
        server_metrics.clone(),
    );

    // Task to send messages to WebSocket
    let sender_task = async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming messages
    let conn_id_input = connection_id.clone();
    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => dispatch_client_message(&ctx, client_msg).await,
                    Err(e) => {
                        debug!(conn_id = %conn_id_input, "Unparseable client message: {}", e);
                        let _ = tx
                            .send(ServerMessage::Error {
                                teacher_id: None,
                                message: format!("invalid message: {}", e),
                            })
                            .await;
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(conn_id = %conn_id_input, "WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => {},
        _ = input_task => {},
    }

    // The queue is untouched by a disconnect; only this viewer's forwarder goes.
    ctx.leave_room().await;

    if let Some(ref m) = server_metrics {
        m.connection_closed();
    }
    info!(conn_id = %connection_id, "Queue WebSocket connection closed");
}
