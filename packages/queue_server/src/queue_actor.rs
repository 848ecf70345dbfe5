//! Single-writer actor owning one teacher's queue.
//!
//! Every mutation for a teacher goes through this actor's command channel, so
//! operations on one queue are applied strictly one at a time. After each
//! committed mutation the new snapshot is published on a `watch` channel (for
//! lock-free reads) and broadcast to the teacher's room before the next
//! command is taken.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use conference_queue::{EntryId, QueueChange, QueueEntry, QueueError, TeacherId, TeacherQueue};

use crate::error::ServerError;
use crate::metrics::ServerMetrics;
use crate::ws::ServerMessage;

type Reply = oneshot::Sender<Result<QueueChange, QueueError>>;

#[derive(Debug)]
pub enum QueueCommand {
    Complete {
        expected: Option<EntryId>,
        respond_to: Reply,
    },
    Skip {
        expected: Option<EntryId>,
        respond_to: Reply,
    },
    ConfirmPromotion {
        entry_id: EntryId,
        respond_to: Reply,
    },
    Enqueue {
        entry: QueueEntry,
        respond_to: Reply,
    },
    Remove {
        entry_id: EntryId,
        respond_to: Reply,
    },
}

/// Immutable view of a queue at one version.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub teacher_id: TeacherId,
    pub queue: TeacherQueue,
    pub version: u64,
}

impl QueueSnapshot {
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::QueueSnapshot {
            teacher_id: self.teacher_id.clone(),
            queue: self.queue.to_vec(),
            version: self.version,
            stats: self.queue.stats(),
        }
    }
}

/// Handle to communicate with a queue actor
#[derive(Clone, Debug)]
pub struct QueueHandle {
    teacher_id: TeacherId,
    sender: mpsc::Sender<QueueCommand>,
    snapshot_rx: watch::Receiver<QueueSnapshot>,
    room: broadcast::Sender<ServerMessage>,
}

impl QueueHandle {
    pub fn teacher_id(&self) -> &TeacherId {
        &self.teacher_id
    }

    /// Latest committed state. Never waits on the actor.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receive every snapshot and promotion rejection for this room.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.room.subscribe()
    }

    pub async fn complete(&self, expected: Option<EntryId>) -> Result<QueueChange, ServerError> {
        self.request(|respond_to| QueueCommand::Complete {
            expected,
            respond_to,
        })
        .await
    }

    pub async fn skip(&self, expected: Option<EntryId>) -> Result<QueueChange, ServerError> {
        self.request(|respond_to| QueueCommand::Skip {
            expected,
            respond_to,
        })
        .await
    }

    pub async fn confirm_promotion(&self, entry_id: EntryId) -> Result<QueueChange, ServerError> {
        self.request(|respond_to| QueueCommand::ConfirmPromotion {
            entry_id,
            respond_to,
        })
        .await
    }

    pub async fn enqueue(&self, entry: QueueEntry) -> Result<QueueChange, ServerError> {
        self.request(|respond_to| QueueCommand::Enqueue { entry, respond_to })
            .await
    }

    pub async fn remove(&self, entry_id: EntryId) -> Result<QueueChange, ServerError> {
        self.request(|respond_to| QueueCommand::Remove {
            entry_id,
            respond_to,
        })
        .await
    }

    async fn request(&self, build: impl FnOnce(Reply) -> QueueCommand) -> Result<QueueChange, ServerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ServerError::ActorGone(self.teacher_id.clone()))?;
        let result = rx
            .await
            .map_err(|_| ServerError::ActorGone(self.teacher_id.clone()))?;
        Ok(result?)
    }
}

/// Options for spawning a queue actor
#[derive(Clone, Default)]
pub struct ActorOptions {
    /// Maximum parties in the queue (None = unlimited)
    pub capacity: Option<usize>,
    pub broadcast_capacity: usize,
    pub metrics: Option<Arc<ServerMetrics>>,
}

struct QueueActor {
    teacher_id: TeacherId,
    queue: TeacherQueue,
    version: u64,
    capacity: Option<usize>,
    receiver: mpsc::Receiver<QueueCommand>,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    room: broadcast::Sender<ServerMessage>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl QueueActor {
    fn spawn(teacher_id: TeacherId, queue: TeacherQueue, opts: ActorOptions) -> QueueHandle {
        let initial = QueueSnapshot {
            teacher_id: teacher_id.clone(),
            queue: queue.clone(),
            version: 0,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let (room, _) = broadcast::channel(opts.broadcast_capacity.max(1));
        let (sender, receiver) = mpsc::channel(32);

        let actor = QueueActor {
            teacher_id: teacher_id.clone(),
            queue,
            version: 0,
            capacity: opts.capacity,
            receiver,
            snapshot_tx,
            room: room.clone(),
            metrics: opts.metrics,
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        QueueHandle {
            teacher_id,
            sender,
            snapshot_rx,
            room,
        }
    }

    async fn run(mut self) {
        info!(teacher = %self.teacher_id, parties = self.queue.len(), "Queue actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                QueueCommand::Complete {
                    expected,
                    respond_to,
                } => {
                    let result = self.commit(|q| q.complete(expected.as_ref()));
                    if result.is_ok() {
                        self.with_metrics(ServerMetrics::completed);
                    }
                    let _ = respond_to.send(result);
                }

                QueueCommand::Skip {
                    expected,
                    respond_to,
                } => {
                    let result = self.commit(|q| q.skip(expected.as_ref()));
                    if result.is_ok() {
                        self.with_metrics(ServerMetrics::skipped);
                    }
                    let _ = respond_to.send(result);
                }

                QueueCommand::ConfirmPromotion {
                    entry_id,
                    respond_to,
                } => {
                    let result = self.commit(|q| q.confirm_promotion(&entry_id));
                    match &result {
                        Ok(_) => self.with_metrics(ServerMetrics::promotion_confirmed),
                        Err(err) => {
                            debug!(teacher = %self.teacher_id, entry = %entry_id, reason = err.reason_code(), "Promotion rejected");
                            self.with_metrics(ServerMetrics::promotion_rejected);
                            let _ = self.room.send(ServerMessage::promotion_rejected(
                                self.teacher_id.clone(),
                                entry_id,
                                err,
                            ));
                        }
                    }
                    let _ = respond_to.send(result);
                }

                QueueCommand::Enqueue { entry, respond_to } => {
                    let capacity = self.capacity;
                    let result = self.commit(|q| q.enqueue(entry, capacity));
                    let _ = respond_to.send(result);
                }

                QueueCommand::Remove {
                    entry_id,
                    respond_to,
                } => {
                    let result = self.commit(|q| q.remove(&entry_id));
                    let _ = respond_to.send(result);
                }
            }
        }

        debug!(teacher = %self.teacher_id, "Queue actor stopped");
    }

    /// Apply a transition; on success publish and broadcast the new snapshot.
    fn commit(
        &mut self,
        op: impl FnOnce(&TeacherQueue) -> Result<(TeacherQueue, QueueChange), QueueError>,
    ) -> Result<QueueChange, QueueError> {
        let (next, change) = op(&self.queue)?;
        self.queue = next;
        self.version += 1;

        let snapshot = QueueSnapshot {
            teacher_id: self.teacher_id.clone(),
            queue: self.queue.clone(),
            version: self.version,
        };
        let message = snapshot.to_message();
        self.snapshot_tx.send_replace(snapshot);
        // No receivers is fine: nobody is watching this room yet.
        let _ = self.room.send(message);
        self.with_metrics(ServerMetrics::snapshot_broadcast);

        debug!(teacher = %self.teacher_id, version = self.version, ?change, "Queue updated");
        Ok(change)
    }

    fn with_metrics(&self, f: impl FnOnce(&ServerMetrics)) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }
}

/// Spawn the actor for one teacher and return its handle
pub fn spawn_queue(teacher_id: TeacherId, queue: TeacherQueue, opts: ActorOptions) -> QueueHandle {
    QueueActor::spawn(teacher_id, queue, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_queue::EntryStatus;

    fn opts() -> ActorOptions {
        ActorOptions {
            capacity: Some(4),
            broadcast_capacity: 16,
            metrics: Some(Arc::new(ServerMetrics::new())),
        }
    }

    fn seeded() -> TeacherQueue {
        TeacherQueue::from_entries(vec![
            QueueEntry::current("P1", "A"),
            QueueEntry::waiting("P2", "B"),
            QueueEntry::waiting("P3", "C"),
        ])
        .unwrap()
    }

    fn ids(snapshot: &QueueSnapshot) -> Vec<(String, EntryStatus)> {
        snapshot
            .queue
            .entries()
            .iter()
            .map(|e| (e.id.to_string(), e.status))
            .collect()
    }

    #[tokio::test]
    async fn complete_broadcasts_snapshot_to_room() {
        let handle = spawn_queue(TeacherId::from("t1"), seeded(), opts());
        let mut room = handle.subscribe();

        handle.complete(None).await.unwrap();

        match room.recv().await.unwrap() {
            ServerMessage::QueueSnapshot {
                teacher_id,
                queue,
                version,
                stats,
            } => {
                assert_eq!(teacher_id, TeacherId::from("t1"));
                assert_eq!(version, 1);
                assert_eq!(queue[0].id, EntryId::from("P2"));
                assert!(queue[0].is_current());
                assert_eq!(stats.completed, 1);
            }
            other => panic!("Expected QueueSnapshot, got {other:?}"),
        }
        assert_eq!(handle.snapshot().version, 1);
    }

    #[tokio::test]
    async fn skip_reorders_authoritative_queue() {
        let handle = spawn_queue(TeacherId::from("t1"), seeded(), opts());
        handle.skip(Some(EntryId::from("P1"))).await.unwrap();
        assert_eq!(
            ids(&handle.snapshot()),
            vec![
                ("P2".to_string(), EntryStatus::Current),
                ("P1".to_string(), EntryStatus::Waiting),
                ("P3".to_string(), EntryStatus::Waiting),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_promotion_is_broadcast_and_state_kept() {
        let handle = spawn_queue(TeacherId::from("t1"), seeded(), opts());
        let mut room = handle.subscribe();

        let err = handle
            .confirm_promotion(EntryId::from("P2"))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "current_already_assigned");

        match room.recv().await.unwrap() {
            ServerMessage::PromotionRejected {
                entry_id, reason, ..
            } => {
                assert_eq!(entry_id, Some(EntryId::from("P2")));
                assert_eq!(reason, "current_already_assigned");
            }
            other => panic!("Expected PromotionRejected, got {other:?}"),
        }
        assert_eq!(handle.snapshot().version, 0);
    }

    #[tokio::test]
    async fn concurrent_completes_are_serialized() {
        let handle = spawn_queue(TeacherId::from("t1"), seeded(), opts());
        let guarded = EntryId::from("P1");

        let (a, b) = tokio::join!(
            handle.complete(Some(guarded.clone())),
            handle.complete(Some(guarded.clone()))
        );
        // exactly one of the two guarded completes lands
        assert!(a.is_ok() ^ b.is_ok());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.version, 1);
        assert_eq!(
            snapshot.queue.entries().iter().filter(|e| e.is_current()).count(),
            1
        );
    }

    #[tokio::test]
    async fn enqueue_respects_capacity() {
        let handle = spawn_queue(TeacherId::from("t1"), seeded(), opts());
        handle
            .enqueue(QueueEntry::waiting("P4", "D"))
            .await
            .unwrap();
        let err = handle
            .enqueue(QueueEntry::waiting("P5", "E"))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "queue_full");
    }

    #[tokio::test]
    async fn failed_mutation_does_not_broadcast() {
        let handle = spawn_queue(TeacherId::from("t1"), TeacherQueue::new(), opts());
        let mut room = handle.subscribe();
        let err = handle.complete(None).await.unwrap_err();
        assert_eq!(err.reason_code(), "no_current_entry");
        assert!(matches!(
            room.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
