//! Per-message dispatch for queue WebSocket connections.

use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use conference_queue::TeacherId;

use crate::error::ServerError;
use crate::metrics::ServerMetrics;
use crate::queue_actor::QueueHandle;
use crate::queue_registry::QueueRegistry;
use crate::teacher_actions::{self, ActionOutcome, TeacherAction};

use super::protocol::{ClientMessage, ServerMessage};

/// Per-connection state shared between the socket loop and the dispatcher.
pub(crate) struct ConnectionContext {
    pub connection_id: String,
    pub tx: mpsc::Sender<ServerMessage>,
    pub registry: Arc<QueueRegistry>,
    pub metrics: Option<Arc<ServerMetrics>>,
    /// Room this connection currently follows
    pub joined: Arc<RwLock<Option<TeacherId>>>,
    /// Cancels the forwarder of the current room
    pub room_cancel: Arc<RwLock<Option<CancellationToken>>>,
}

impl ConnectionContext {
    pub(crate) fn new(
        connection_id: String,
        tx: mpsc::Sender<ServerMessage>,
        registry: Arc<QueueRegistry>,
        metrics: Option<Arc<ServerMetrics>>,
    ) -> Self {
        Self {
            connection_id,
            tx,
            registry,
            metrics,
            joined: Arc::new(RwLock::new(None)),
            room_cancel: Arc::new(RwLock::new(None)),
        }
    }

    /// Stop forwarding the current room, if any.
    pub(crate) async fn leave_room(&self) {
        if let Some(cancel) = self.room_cancel.write().await.take() {
            cancel.cancel();
        }
        if let Some(prev) = self.joined.write().await.take() {
            debug!(conn_id = %self.connection_id, teacher = %prev, "Left room");
        }
    }

    async fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).await.is_err() {
            warn!(conn_id = %self.connection_id, "Failed to queue message - channel closed");
        }
    }
}

pub(crate) async fn dispatch_client_message(ctx: &ConnectionContext, msg: ClientMessage) {
    if let Some(m) = &ctx.metrics {
        m.message_received();
    }

    match msg {
        ClientMessage::JoinRoom { teacher_id } => {
            ctx.leave_room().await;

            let handle = match ctx.registry.get(&teacher_id).await {
                Ok(handle) => handle,
                Err(err) => {
                    debug!(conn_id = %ctx.connection_id, teacher = %teacher_id, "Join refused: {}", err);
                    ctx.send(ServerMessage::Error {
                        teacher_id: Some(teacher_id),
                        message: err.to_string(),
                    })
                    .await;
                    return;
                }
            };

            // Subscribe before reading the snapshot so no mutation falls
            // between the two.
            let room_rx = handle.subscribe();
            let initial = handle.snapshot();
            ctx.send(initial.to_message()).await;

            let cancel = CancellationToken::new();
            *ctx.room_cancel.write().await = Some(cancel.clone());
            *ctx.joined.write().await = Some(teacher_id.clone());
            if let Some(m) = &ctx.metrics {
                m.room_joined();
            }
            debug!(conn_id = %ctx.connection_id, teacher = %teacher_id, "Joined room");

            tokio::spawn(forward_room(
                handle,
                room_rx,
                initial.version,
                ctx.tx.clone(),
                cancel,
                ctx.metrics.clone(),
            ));
        }

        ClientMessage::LeaveRoom => ctx.leave_room().await,

        ClientMessage::Complete {
            teacher_id,
            entry_id,
        } => {
            teacher_action(ctx, teacher_id, TeacherAction::Complete, entry_id).await;
        }

        ClientMessage::Skip {
            teacher_id,
            entry_id,
        } => {
            teacher_action(ctx, teacher_id, TeacherAction::Skip, entry_id).await;
        }

        ClientMessage::ConfirmPromotion {
            teacher_id,
            entry_id,
        } => {
            let handle = match ctx.registry.get(&teacher_id).await {
                Ok(handle) => handle,
                Err(err) => {
                    // No room to broadcast to; answer the requester directly.
                    ctx.send(ServerMessage::promotion_rejected(teacher_id, entry_id, &err))
                        .await;
                    return;
                }
            };
            match handle.confirm_promotion(entry_id).await {
                // Acceptance and rejection both reach the room via the actor.
                Ok(_) | Err(ServerError::Queue(_)) => {}
                Err(err) => {
                    error!(teacher = %teacher_id, "Confirm promotion failed: {}", err);
                    ctx.send(ServerMessage::Error {
                        teacher_id: Some(teacher_id),
                        message: err.to_string(),
                    })
                    .await;
                }
            }
        }

        ClientMessage::Heartbeat => {
            ctx.send(ServerMessage::HeartbeatAck {
                server_time: chrono::Utc::now().to_rfc3339(),
            })
            .await;
        }
    }
}

async fn teacher_action(
    ctx: &ConnectionContext,
    teacher_id: TeacherId,
    action: TeacherAction,
    entry_id: Option<conference_queue::EntryId>,
) {
    let outcome = teacher_actions::perform(
        &ctx.registry,
        &teacher_id,
        action,
        entry_id,
        ctx.metrics.as_deref(),
    )
    .await;

    match outcome {
        Ok(ActionOutcome::Applied(_)) => {}
        Ok(ActionOutcome::NothingToDo(err)) | Ok(ActionOutcome::Rejected(err)) => {
            ctx.send(ServerMessage::action_rejected(teacher_id, action, &err))
                .await;
        }
        Err(err) => {
            error!(teacher = %teacher_id, %action, "Teacher action failed: {}", err);
            ctx.send(ServerMessage::Error {
                teacher_id: Some(teacher_id),
                message: err.to_string(),
            })
            .await;
        }
    }
}

/// Relay a room's broadcasts to one connection until cancelled.
///
/// A lagging connection has missed snapshots; since every snapshot is the
/// full queue, it is resynced with the latest one instead. Snapshots at or
/// below the last version sent are dropped, so a connection never sees its
/// queue go backwards.
async fn forward_room(
    handle: QueueHandle,
    mut room_rx: broadcast::Receiver<ServerMessage>,
    mut last_sent: u64,
    tx: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
    metrics: Option<Arc<ServerMetrics>>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            recv = room_rx.recv() => match recv {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(teacher = %handle.teacher_id(), "Room broadcast lagged by {} messages", n);
                    if let Some(m) = &metrics {
                        m.messages_dropped(n);
                    }
                    handle.snapshot().to_message()
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if let ServerMessage::QueueSnapshot { version, .. } = &msg {
            if *version <= last_sent {
                trace!(teacher = %handle.teacher_id(), version, last_sent, "Skipping stale snapshot");
                continue;
            }
            last_sent = *version;
        }
        if tx.send(msg).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::seed::parse_roster;
    use conference_queue::{EntryId, QueueEntry};
    use std::path::PathBuf;

    fn context() -> (ConnectionContext, mpsc::Receiver<ServerMessage>) {
        context_with(16, 32, None)
    }

    fn context_with(
        broadcast_capacity: usize,
        channel_capacity: usize,
        metrics: Option<Arc<ServerMetrics>>,
    ) -> (ConnectionContext, mpsc::Receiver<ServerMessage>) {
        let roster = parse_roster(
            r#"[{"id": "t1", "queue": [
                {"id": "P1", "status": "current"},
                {"id": "P2"}
            ]}, {"id": "t2"}]"#,
        )
        .unwrap();
        let config = QueueConfig {
            seed_file: PathBuf::from("unused"),
            max_parents: None,
            strict_roster: true,
            max_unlisted_queues: 8,
        };
        let registry = Arc::new(QueueRegistry::new(
            roster,
            &config,
            broadcast_capacity,
            metrics.clone(),
        ));
        let (tx, rx) = mpsc::channel(channel_capacity);
        (
            ConnectionContext::new("conn-1".to_string(), tx, registry, metrics),
            rx,
        )
    }

    #[tokio::test]
    async fn join_sends_current_snapshot() {
        let (ctx, mut rx) = context();
        dispatch_client_message(
            &ctx,
            ClientMessage::JoinRoom {
                teacher_id: TeacherId::from("t1"),
            },
        )
        .await;

        match rx.recv().await.unwrap() {
            ServerMessage::QueueSnapshot { queue, version, .. } => {
                assert_eq!(queue.len(), 2);
                assert_eq!(version, 0);
            }
            other => panic!("Expected QueueSnapshot, got {other:?}"),
        }
        assert_eq!(*ctx.joined.read().await, Some(TeacherId::from("t1")));
    }

    #[tokio::test]
    async fn join_unknown_room_reports_error() {
        let (ctx, mut rx) = context();
        dispatch_client_message(
            &ctx,
            ClientMessage::JoinRoom {
                teacher_id: TeacherId::from("ghost"),
            },
        )
        .await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Error { .. }
        ));
        assert!(ctx.joined.read().await.is_none());
    }

    #[tokio::test]
    async fn action_on_empty_queue_sends_notice() {
        let (ctx, mut rx) = context();
        dispatch_client_message(
            &ctx,
            ClientMessage::Complete {
                teacher_id: TeacherId::from("t2"),
                entry_id: None,
            },
        )
        .await;
        match rx.recv().await.unwrap() {
            ServerMessage::ActionRejected {
                nothing_to_do,
                action,
                ..
            } => {
                assert!(nothing_to_do);
                assert_eq!(action, TeacherAction::Complete);
            }
            other => panic!("Expected ActionRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn joined_connection_sees_mutations() {
        let (ctx, mut rx) = context();
        let teacher = TeacherId::from("t1");
        dispatch_client_message(
            &ctx,
            ClientMessage::JoinRoom {
                teacher_id: teacher.clone(),
            },
        )
        .await;
        let _initial = rx.recv().await.unwrap();

        dispatch_client_message(
            &ctx,
            ClientMessage::Skip {
                teacher_id: teacher.clone(),
                entry_id: Some(EntryId::from("P1")),
            },
        )
        .await;

        match rx.recv().await.unwrap() {
            ServerMessage::QueueSnapshot { queue, version, .. } => {
                assert_eq!(version, 1);
                assert_eq!(queue[0].id, EntryId::from("P2"));
                assert_eq!(queue[1].id, EntryId::from("P1"));
            }
            other => panic!("Expected QueueSnapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn leave_room_stops_forwarding() {
        let (ctx, mut rx) = context();
        let teacher = TeacherId::from("t1");
        dispatch_client_message(
            &ctx,
            ClientMessage::JoinRoom {
                teacher_id: teacher.clone(),
            },
        )
        .await;
        let _initial = rx.recv().await.unwrap();
        dispatch_client_message(&ctx, ClientMessage::LeaveRoom).await;
        tokio::task::yield_now().await;

        let handle = ctx.registry.get(&teacher).await.unwrap();
        handle.complete(None).await.unwrap();
        let waited = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(waited.is_err(), "no snapshot after leaving the room");
    }

    #[tokio::test]
    async fn lagging_connection_never_goes_back_a_version() {
        let metrics = Arc::new(ServerMetrics::new());
        // Room buffer of 2 and a connection that holds a single message.
        let (ctx, mut rx) = context_with(2, 1, Some(metrics.clone()));
        let teacher = TeacherId::from("t1");
        dispatch_client_message(
            &ctx,
            ClientMessage::JoinRoom {
                teacher_id: teacher.clone(),
            },
        )
        .await;

        let handle = ctx.registry.get(&teacher).await.unwrap();
        for i in 0..5 {
            handle
                .enqueue(QueueEntry::waiting(format!("W{i}"), "Walk-in"))
                .await
                .unwrap();
        }

        let mut versions = Vec::new();
        while versions.last() != Some(&5) {
            let msg = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
                .await
                .expect("snapshot stream stalled")
                .unwrap();
            if let ServerMessage::QueueSnapshot { version, .. } = msg {
                versions.push(version);
            }
        }
        assert!(
            versions.windows(2).all(|w| w[0] < w[1]),
            "versions went backwards: {versions:?}"
        );
        assert!(metrics.snapshot().messages.dropped > 0);

        let extra = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(extra.is_err(), "nothing after the latest version");
    }

    #[tokio::test]
    async fn heartbeat_is_acknowledged() {
        let (ctx, mut rx) = context();
        dispatch_client_message(&ctx, ClientMessage::Heartbeat).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::HeartbeatAck { .. }
        ));
    }
}
