//! Authoritative per-teacher queue.
//!
//! A [`TeacherQueue`] is an immutable value. Every transition returns a new
//! queue plus a [`QueueChange`] describing what happened; the old value is
//! left untouched so readers can hold snapshots without locking.
//!
//! Stored entries are always either `current` or `waiting`. The current entry,
//! if any, sits at index 0 and waiting entries follow in service order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::QueueError;
use crate::model::{EntryId, EntryStatus, QueueEntry};

/// Per-status counts for a queue, including finished parties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub current: usize,
    pub completed: u64,
    pub skipped: u64,
}

/// What a successful transition did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum QueueChange {
    Completed {
        entry: EntryId,
        promoted: Option<EntryId>,
    },
    /// `promoted` is `None` when the skipped party was alone and stays current.
    Skipped {
        entry: EntryId,
        promoted: Option<EntryId>,
    },
    Promoted {
        entry: EntryId,
    },
    Enqueued {
        entry: EntryId,
    },
    Removed {
        entry: EntryId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherQueue {
    entries: Arc<[QueueEntry]>,
    completed: u64,
    skipped: u64,
}

impl Default for TeacherQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TeacherQueue {
    pub fn new() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
            completed: 0,
            skipped: 0,
        }
    }

    /// Build a queue from externally supplied entries.
    ///
    /// Completed entries are dropped, skipped entries rejoin as waiting, and
    /// the current entry (if any) is moved to the front. Duplicate ids or two
    /// current entries are refused.
    pub fn from_entries(entries: Vec<QueueEntry>) -> Result<Self, QueueError> {
        let mut seen = HashSet::new();
        let mut current: Option<QueueEntry> = None;
        let mut waiting = Vec::with_capacity(entries.len());

        for entry in entries {
            if !seen.insert(entry.id.clone()) {
                return Err(QueueError::DuplicateEntry(entry.id));
            }
            match entry.status {
                EntryStatus::Completed => {}
                EntryStatus::Current => {
                    if let Some(first) = &current {
                        return Err(QueueError::MultipleCurrent {
                            first: first.id.clone(),
                            second: entry.id,
                        });
                    }
                    current = Some(entry);
                }
                EntryStatus::Waiting | EntryStatus::Skipped => {
                    waiting.push(entry.with_status(EntryStatus::Waiting));
                }
            }
        }

        let mut ordered = Vec::with_capacity(waiting.len() + 1);
        ordered.extend(current);
        ordered.extend(waiting);
        Ok(Self {
            entries: ordered.into(),
            completed: 0,
            skipped: 0,
        })
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<QueueEntry> {
        self.entries.to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.is_current())
    }

    pub fn waiting(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(|e| e.is_waiting())
    }

    pub fn get(&self, id: &EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Number of parties ahead of `id` (0 for the current party).
    pub fn position_of(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            waiting: self.waiting().count(),
            current: usize::from(self.current().is_some()),
            completed: self.completed,
            skipped: self.skipped,
        }
    }

    /// Finish the current party and promote the earliest waiting one.
    ///
    /// `expected` guards against acting on a queue that already moved on.
    pub fn complete(&self, expected: Option<&EntryId>) -> Result<(Self, QueueChange), QueueError> {
        let idx = self.current_index(expected)?;
        let finished = self.entries[idx].id.clone();

        let mut rest = self.without(idx);
        let promoted = promote_first_waiting(&mut rest);

        let mut next = self.replaced(rest);
        next.completed += 1;
        Ok((
            next,
            QueueChange::Completed {
                entry: finished,
                promoted,
            },
        ))
    }

    /// Send the current party back to wait behind the next one.
    ///
    /// With nobody else queued the party stays current and the queue is
    /// returned unchanged.
    pub fn skip(&self, expected: Option<&EntryId>) -> Result<(Self, QueueChange), QueueError> {
        let idx = self.current_index(expected)?;
        let skipped = self.entries[idx].clone();

        let mut rest = self.without(idx);
        let Some(promoted) = promote_first_waiting(&mut rest) else {
            return Ok((
                self.clone(),
                QueueChange::Skipped {
                    entry: skipped.id,
                    promoted: None,
                },
            ));
        };

        // rest[0] is the new current party
        rest.insert(1, skipped.with_status(EntryStatus::Waiting));

        let mut next = self.replaced(rest);
        next.skipped += 1;
        Ok((
            next,
            QueueChange::Skipped {
                entry: skipped.id,
                promoted: Some(promoted),
            },
        ))
    }

    /// Commit a client's optimistic promotion of `id`.
    pub fn confirm_promotion(&self, id: &EntryId) -> Result<(Self, QueueChange), QueueError> {
        if let Some(current) = self.current() {
            return Err(QueueError::CurrentAlreadyAssigned {
                current: current.id.clone(),
            });
        }
        let idx = self
            .position_of(id)
            .ok_or_else(|| QueueError::UnknownEntry(id.clone()))?;
        if !self.entries[idx].is_waiting() {
            return Err(QueueError::EntryNotWaiting(id.clone()));
        }

        let mut rest = self.without(idx);
        rest.insert(0, self.entries[idx].with_status(EntryStatus::Current));

        Ok((
            self.replaced(rest),
            QueueChange::Promoted { entry: id.clone() },
        ))
    }

    /// Append a new waiting party. Never promotes.
    pub fn enqueue(
        &self,
        entry: QueueEntry,
        capacity: Option<usize>,
    ) -> Result<(Self, QueueChange), QueueError> {
        if self.position_of(&entry.id).is_some() {
            return Err(QueueError::DuplicateEntry(entry.id));
        }
        if let Some(capacity) = capacity {
            if self.len() >= capacity {
                return Err(QueueError::QueueFull { capacity });
            }
        }

        let id = entry.id.clone();
        let mut entries = self.to_vec();
        entries.push(entry.with_status(EntryStatus::Waiting));
        Ok((self.replaced(entries), QueueChange::Enqueued { entry: id }))
    }

    /// Drop a party from the queue. Removing the current party leaves the
    /// queue without one; promotion is left to the clients.
    pub fn remove(&self, id: &EntryId) -> Result<(Self, QueueChange), QueueError> {
        let idx = self
            .position_of(id)
            .ok_or_else(|| QueueError::UnknownEntry(id.clone()))?;
        Ok((
            self.replaced(self.without(idx)),
            QueueChange::Removed { entry: id.clone() },
        ))
    }

    fn current_index(&self, expected: Option<&EntryId>) -> Result<usize, QueueError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.is_current())
            .ok_or(QueueError::NoCurrentEntry)?;
        if let Some(expected) = expected {
            let actual = &self.entries[idx].id;
            if actual != expected {
                return Err(QueueError::StaleAction {
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(idx)
    }

    fn without(&self, idx: usize) -> Vec<QueueEntry> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, e)| e.clone())
            .collect()
    }

    fn replaced(&self, entries: Vec<QueueEntry>) -> Self {
        Self {
            entries: entries.into(),
            completed: self.completed,
            skipped: self.skipped,
        }
    }
}

/// Move the earliest waiting entry to the front as current.
fn promote_first_waiting(entries: &mut Vec<QueueEntry>) -> Option<EntryId> {
    let pos = entries.iter().position(|e| e.is_waiting())?;
    let mut entry = entries.remove(pos);
    entry.status = EntryStatus::Current;
    let id = entry.id.clone();
    entries.insert(0, entry);
    Some(id)
}
