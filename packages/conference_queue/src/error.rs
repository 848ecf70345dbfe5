//! Queue rejection reasons and their stable reason codes.

use crate::model::{EntryId, TeacherId};

/// Broad class of a [`QueueError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation would break a queue invariant (or has nothing to act on).
    InvariantViolation,
    /// The named teacher or entry does not exist.
    UnknownIdentifier,
}

/// Every way a queue operation can be refused.
///
/// None of these are fatal: callers turn them into a rejection event or a
/// "nothing to do" report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("unknown queue: {0}")]
    UnknownQueue(TeacherId),

    #[error("unknown entry: {0}")]
    UnknownEntry(EntryId),

    #[error("no current entry")]
    NoCurrentEntry,

    #[error("entry {current} is already current")]
    CurrentAlreadyAssigned { current: EntryId },

    #[error("entry {0} is not waiting")]
    EntryNotWaiting(EntryId),

    #[error("expected {expected} to be current, found {actual}")]
    StaleAction { expected: EntryId, actual: EntryId },

    #[error("entry {0} is already queued")]
    DuplicateEntry(EntryId),

    #[error("queue is full ({capacity} parties)")]
    QueueFull { capacity: usize },

    #[error("more than one current entry: {first} and {second}")]
    MultipleCurrent { first: EntryId, second: EntryId },
}

impl QueueError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownQueue(_) => "unknown_queue",
            Self::UnknownEntry(_) => "unknown_entry",
            Self::NoCurrentEntry => "no_current_entry",
            Self::CurrentAlreadyAssigned { .. } => "current_already_assigned",
            Self::EntryNotWaiting(_) => "entry_not_waiting",
            Self::StaleAction { .. } => "stale_action",
            Self::DuplicateEntry(_) => "duplicate_entry",
            Self::QueueFull { .. } => "queue_full",
            Self::MultipleCurrent { .. } => "multiple_current",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownQueue(_) | Self::UnknownEntry(_) => ErrorKind::UnknownIdentifier,
            _ => ErrorKind::InvariantViolation,
        }
    }

    /// True when a teacher action found nothing to act on.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, Self::NoCurrentEntry | Self::UnknownQueue(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_snake_case() {
        let errors = [
            QueueError::UnknownQueue(TeacherId::from("t1")),
            QueueError::UnknownEntry(EntryId::from("p1")),
            QueueError::NoCurrentEntry,
            QueueError::CurrentAlreadyAssigned {
                current: EntryId::from("p1"),
            },
            QueueError::EntryNotWaiting(EntryId::from("p1")),
            QueueError::StaleAction {
                expected: EntryId::from("p1"),
                actual: EntryId::from("p2"),
            },
            QueueError::DuplicateEntry(EntryId::from("p1")),
            QueueError::QueueFull { capacity: 10 },
            QueueError::MultipleCurrent {
                first: EntryId::from("p1"),
                second: EntryId::from("p2"),
            },
        ];
        for err in &errors {
            let code = err.reason_code();
            assert!(
                code.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "bad code {code}"
            );
        }
    }

    #[test]
    fn unknown_identifiers_are_classified() {
        assert_eq!(
            QueueError::UnknownQueue(TeacherId::from("t9")).kind(),
            ErrorKind::UnknownIdentifier
        );
        assert_eq!(
            QueueError::UnknownEntry(EntryId::from("p9")).kind(),
            ErrorKind::UnknownIdentifier
        );
        assert_eq!(
            QueueError::NoCurrentEntry.kind(),
            ErrorKind::InvariantViolation
        );
    }

    #[test]
    fn display_names_the_entries() {
        let err = QueueError::StaleAction {
            expected: EntryId::from("p1"),
            actual: EntryId::from("p2"),
        };
        assert_eq!(err.to_string(), "expected p1 to be current, found p2");
    }
}
