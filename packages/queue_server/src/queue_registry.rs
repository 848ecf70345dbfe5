use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use conference_queue::{EntryId, QueueError, TeacherId, TeacherQueue};

use crate::config::QueueConfig;
use crate::metrics::ServerMetrics;
use crate::queue_actor::{ActorOptions, QueueHandle, spawn_queue};
use crate::seed::Roster;

/// Listing row for `GET /api/queues`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSummary {
    pub teacher_id: TeacherId,
    pub name: String,
    pub waiting: usize,
    pub current: Option<EntryId>,
    pub version: u64,
}

struct RosterEntry {
    name: String,
    initial: TeacherQueue,
}

/// Process-wide map of teacher queues.
///
/// A queue's actor is started the first time its teacher is referenced and
/// lives for the rest of the process. With a strict roster only seeded
/// teachers get a queue; otherwise any id creates an empty one, up to
/// `max_unlisted_queues` of them.
pub struct QueueRegistry {
    queues: RwLock<HashMap<TeacherId, QueueHandle>>,
    roster: HashMap<TeacherId, RosterEntry>,
    roster_order: Vec<TeacherId>,
    strict_roster: bool,
    max_unlisted_queues: usize,
    actor_options: ActorOptions,
}

impl QueueRegistry {
    pub fn new(
        roster: Roster,
        config: &QueueConfig,
        broadcast_capacity: usize,
        metrics: Option<Arc<ServerMetrics>>,
    ) -> Self {
        let roster_order = roster.teachers.iter().map(|t| t.id.clone()).collect();
        let roster = roster
            .teachers
            .into_iter()
            .map(|t| {
                (
                    t.id,
                    RosterEntry {
                        name: t.name,
                        initial: t.queue,
                    },
                )
            })
            .collect();

        Self {
            queues: RwLock::new(HashMap::new()),
            roster,
            roster_order,
            strict_roster: config.strict_roster,
            max_unlisted_queues: config.max_unlisted_queues,
            actor_options: ActorOptions {
                capacity: config.max_parents,
                broadcast_capacity,
                metrics,
            },
        }
    }

    /// Handle for a teacher's queue, starting its actor on first use.
    pub async fn get(&self, teacher_id: &TeacherId) -> Result<QueueHandle, QueueError> {
        if let Some(handle) = self.queues.read().await.get(teacher_id) {
            return Ok(handle.clone());
        }

        let (initial, listed) = match self.roster.get(teacher_id) {
            Some(entry) => (entry.initial.clone(), true),
            None if self.strict_roster => {
                return Err(QueueError::UnknownQueue(teacher_id.clone()));
            }
            None => (TeacherQueue::new(), false),
        };

        let mut queues = self.queues.write().await;
        // Another caller may have won the race while we waited for the lock
        if let Some(handle) = queues.get(teacher_id) {
            return Ok(handle.clone());
        }
        if !listed {
            let unlisted = queues
                .keys()
                .filter(|id| !self.roster.contains_key(*id))
                .count();
            if unlisted >= self.max_unlisted_queues {
                warn!(
                    teacher = %teacher_id,
                    limit = self.max_unlisted_queues,
                    "Unlisted queue limit reached"
                );
                return Err(QueueError::UnknownQueue(teacher_id.clone()));
            }
        }
        let handle = spawn_queue(teacher_id.clone(), initial, self.actor_options.clone());
        queues.insert(teacher_id.clone(), handle.clone());
        info!(teacher = %teacher_id, "Queue created");
        Ok(handle)
    }

    pub fn is_known(&self, teacher_id: &TeacherId) -> bool {
        !self.strict_roster || self.roster.contains_key(teacher_id)
    }

    pub fn display_name(&self, teacher_id: &TeacherId) -> String {
        self.roster
            .get(teacher_id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| teacher_id.to_string())
    }

    /// Roster teachers in seed order, then any ad-hoc queues by id.
    pub async fn list(&self) -> Vec<QueueSummary> {
        let queues = self.queues.read().await;
        let mut ids = self.roster_order.clone();
        let mut extra: Vec<TeacherId> = queues
            .keys()
            .filter(|id| !self.roster.contains_key(*id))
            .cloned()
            .collect();
        extra.sort();
        ids.extend(extra);

        ids.into_iter()
            .map(|id| {
                let (queue, version) = match queues.get(&id) {
                    Some(handle) => {
                        let snapshot = handle.snapshot();
                        (snapshot.queue, snapshot.version)
                    }
                    None => (
                        self.roster
                            .get(&id)
                            .map(|e| e.initial.clone())
                            .unwrap_or_default(),
                        0,
                    ),
                };
                QueueSummary {
                    name: self.display_name(&id),
                    waiting: queue.waiting().count(),
                    current: queue.current().map(|e| e.id.clone()),
                    version,
                    teacher_id: id,
                }
            })
            .collect()
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    pub async fn active_count(&self) -> usize {
        self.queues.read().await.len()
    }
}
