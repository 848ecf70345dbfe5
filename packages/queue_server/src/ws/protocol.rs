//! WebSocket Protocol Types
//!
//! Message types exchanged over the room-scoped queue channel.

use serde::{Deserialize, Serialize};

use conference_queue::{EntryId, QueueEntry, QueueError, QueueStats, TeacherId};

use crate::teacher_actions::TeacherAction;

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to a teacher's queue. Joining another room leaves the old one.
    JoinRoom { teacher_id: TeacherId },

    LeaveRoom,

    /// Finish the current party. `entry_id` is the party the teacher saw as
    /// current; the action is refused if the queue has moved on.
    Complete {
        teacher_id: TeacherId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry_id: Option<EntryId>,
    },

    /// Send the current party back to wait behind the next one.
    Skip {
        teacher_id: TeacherId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry_id: Option<EntryId>,
    },

    /// Commit an optimistic promotion.
    ConfirmPromotion {
        teacher_id: TeacherId,
        entry_id: EntryId,
    },

    Heartbeat,
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full authoritative queue. Replaces whatever the client holds.
    QueueSnapshot {
        teacher_id: TeacherId,
        queue: Vec<QueueEntry>,
        /// Increases by one per committed mutation of this queue
        version: u64,
        stats: QueueStats,
    },

    /// A confirm request failed validation. Sent to the whole room.
    PromotionRejected {
        teacher_id: TeacherId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry_id: Option<EntryId>,
        reason: String,
    },

    /// A teacher action was refused. Sent only to the requesting connection.
    ActionRejected {
        teacher_id: TeacherId,
        action: TeacherAction,
        reason: String,
        message: String,
        /// True for an empty or idle queue: show a notice, not an error.
        nothing_to_do: bool,
    },

    HeartbeatAck {
        server_time: String,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        teacher_id: Option<TeacherId>,
        message: String,
    },
}

impl ServerMessage {
    pub fn promotion_rejected(teacher_id: TeacherId, entry_id: EntryId, err: &QueueError) -> Self {
        Self::PromotionRejected {
            teacher_id,
            entry_id: Some(entry_id),
            reason: err.reason_code().to_string(),
        }
    }

    pub fn action_rejected(teacher_id: TeacherId, action: TeacherAction, err: &QueueError) -> Self {
        Self::ActionRejected {
            teacher_id,
            action,
            reason: err.reason_code().to_string(),
            message: err.to_string(),
            nothing_to_do: err.is_nothing_to_do(),
        }
    }

    /// Room this message belongs to, if any.
    pub fn teacher_id(&self) -> Option<&TeacherId> {
        match self {
            Self::QueueSnapshot { teacher_id, .. }
            | Self::PromotionRejected { teacher_id, .. }
            | Self::ActionRejected { teacher_id, .. } => Some(teacher_id),
            Self::Error { teacher_id, .. } => teacher_id.as_ref(),
            Self::HeartbeatAck { .. } => None,
        }
    }
}
