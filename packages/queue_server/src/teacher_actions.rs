//! Teacher-initiated complete/skip.
//!
//! Both go straight to the authoritative queue; the queue actor's own
//! broadcast updates every viewer, the caller included. Refusals come back as
//! an [`ActionOutcome`] rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use conference_queue::{EntryId, QueueChange, QueueError, TeacherId};

use crate::error::ServerError;
use crate::metrics::ServerMetrics;
use crate::queue_registry::QueueRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherAction {
    Complete,
    Skip,
}

impl fmt::Display for TeacherAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied(QueueChange),
    /// Empty queue, idle queue or unknown teacher: show a notice.
    NothingToDo(QueueError),
    /// The queue moved on (stale guard) or another invariant refused it.
    Rejected(QueueError),
}

impl ActionOutcome {
    fn from_error(err: QueueError) -> Self {
        if err.is_nothing_to_do() {
            Self::NothingToDo(err)
        } else {
            Self::Rejected(err)
        }
    }
}

pub async fn complete(
    registry: &QueueRegistry,
    teacher_id: &TeacherId,
    expected: Option<EntryId>,
    metrics: Option<&ServerMetrics>,
) -> Result<ActionOutcome, ServerError> {
    perform(registry, teacher_id, TeacherAction::Complete, expected, metrics).await
}

pub async fn skip(
    registry: &QueueRegistry,
    teacher_id: &TeacherId,
    expected: Option<EntryId>,
    metrics: Option<&ServerMetrics>,
) -> Result<ActionOutcome, ServerError> {
    perform(registry, teacher_id, TeacherAction::Skip, expected, metrics).await
}

pub async fn perform(
    registry: &QueueRegistry,
    teacher_id: &TeacherId,
    action: TeacherAction,
    expected: Option<EntryId>,
    metrics: Option<&ServerMetrics>,
) -> Result<ActionOutcome, ServerError> {
    let handle = match registry.get(teacher_id).await {
        Ok(handle) => handle,
        Err(err) => return Ok(rejected(teacher_id, action, err, metrics)),
    };

    let result = match action {
        TeacherAction::Complete => handle.complete(expected).await,
        TeacherAction::Skip => handle.skip(expected).await,
    };

    match result {
        Ok(change) => {
            info!(teacher = %teacher_id, %action, ?change, "Teacher action applied");
            Ok(ActionOutcome::Applied(change))
        }
        Err(ServerError::Queue(err)) => Ok(rejected(teacher_id, action, err, metrics)),
        Err(err) => Err(err),
    }
}

fn rejected(
    teacher_id: &TeacherId,
    action: TeacherAction,
    err: QueueError,
    metrics: Option<&ServerMetrics>,
) -> ActionOutcome {
    debug!(teacher = %teacher_id, %action, reason = err.reason_code(), "Teacher action refused");
    if let Some(m) = metrics {
        m.action_rejected();
    }
    ActionOutcome::from_error(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::seed::parse_roster;
    use std::path::PathBuf;

    fn registry() -> QueueRegistry {
        let roster = parse_roster(
            r#"[
                {"id": "t1", "queue": [
                    {"id": "P1", "status": "current"},
                    {"id": "P2"},
                    {"id": "P3"}
                ]},
                {"id": "empty"}
            ]"#,
        )
        .unwrap();
        let config = QueueConfig {
            seed_file: PathBuf::from("unused"),
            max_parents: None,
            strict_roster: true,
            max_unlisted_queues: 8,
        };
        QueueRegistry::new(roster, &config, 16, None)
    }

    #[tokio::test]
    async fn complete_applies_and_reports_change() {
        let registry = registry();
        let metrics = ServerMetrics::new();
        let outcome = complete(&registry, &TeacherId::from("t1"), None, Some(&metrics))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Applied(QueueChange::Completed {
                entry: EntryId::from("P1"),
                promoted: Some(EntryId::from("P2")),
            })
        );
        assert_eq!(metrics.snapshot().queue.actions_rejected, 0);
    }

    #[tokio::test]
    async fn empty_queue_is_nothing_to_do() {
        let registry = registry();
        let metrics = ServerMetrics::new();
        let outcome = skip(&registry, &TeacherId::from("empty"), None, Some(&metrics))
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::NothingToDo(QueueError::NoCurrentEntry));
        assert_eq!(metrics.snapshot().queue.actions_rejected, 1);
    }

    #[tokio::test]
    async fn unknown_teacher_is_nothing_to_do() {
        let outcome = complete(&registry(), &TeacherId::from("ghost"), None, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ActionOutcome::NothingToDo(QueueError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn stale_action_is_rejected() {
        let registry = registry();
        let teacher = TeacherId::from("t1");
        complete(&registry, &teacher, Some(EntryId::from("P1")), None)
            .await
            .unwrap();
        // second tap still names P1, which is already gone
        let outcome = complete(&registry, &teacher, Some(EntryId::from("P1")), None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ActionOutcome::Rejected(QueueError::StaleAction { .. })
        ));
    }
}
