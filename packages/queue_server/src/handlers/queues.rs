use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use conference_queue::{
    EntryId, EntryStatus, QueueChange, QueueEntry, QueueStats, RenderState, TeacherId,
};

use crate::AppState;
use crate::error::{ErrorBody, ServerError};
use crate::teacher_actions::{self, ActionOutcome, TeacherAction};

/// Body of `GET /api/queues/{teacher_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponse {
    pub teacher_id: TeacherId,
    pub name: String,
    pub version: u64,
    pub queue: Vec<QueueEntry>,
    pub stats: QueueStats,
    pub view: RenderState,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub entry_id: Option<EntryId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionResponse {
    Applied {
        change: QueueChange,
    },
    NothingToDo {
        #[serde(flatten)]
        error: ErrorBody,
    },
    Rejected {
        #[serde(flatten)]
        error: ErrorBody,
    },
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(alias = "_id")]
    pub id: EntryId,
    #[serde(alias = "name", alias = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionResponse {
    pub entry_id: EntryId,
    pub status: EntryStatus,
    pub parties_ahead: usize,
}

pub async fn list_queues(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list().await)
}

pub async fn get_queue(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
) -> Result<Json<QueueResponse>, ServerError> {
    let teacher_id = TeacherId::new(teacher_id);
    let snapshot = state.registry.get(&teacher_id).await?.snapshot();
    let stats = snapshot.queue.stats();
    Ok(Json(QueueResponse {
        name: state.registry.display_name(&teacher_id),
        version: snapshot.version,
        view: RenderState::build(snapshot.queue.entries(), Some(&stats)),
        queue: snapshot.queue.to_vec(),
        stats,
        teacher_id,
    }))
}

/// The body is optional; without one the action is not guarded by an entry id.
pub async fn complete_current(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    body: Option<Json<ActionRequest>>,
) -> Response {
    run_action(state, teacher_id, TeacherAction::Complete, body).await
}

pub async fn skip_current(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    body: Option<Json<ActionRequest>>,
) -> Response {
    run_action(state, teacher_id, TeacherAction::Skip, body).await
}

async fn run_action(
    state: AppState,
    teacher_id: String,
    action: TeacherAction,
    body: Option<Json<ActionRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let teacher_id = TeacherId::new(teacher_id);
    let outcome = teacher_actions::perform(
        &state.registry,
        &teacher_id,
        action,
        req.entry_id,
        Some(&state.metrics),
    )
    .await;

    match outcome {
        Ok(ActionOutcome::Applied(change)) => {
            (StatusCode::OK, Json(ActionResponse::Applied { change })).into_response()
        }
        Ok(ActionOutcome::NothingToDo(err)) => (
            StatusCode::OK,
            Json(ActionResponse::NothingToDo {
                error: ErrorBody::from(&err),
            }),
        )
            .into_response(),
        Ok(ActionOutcome::Rejected(err)) => (
            StatusCode::CONFLICT,
            Json(ActionResponse::Rejected {
                error: ErrorBody::from(&err),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn enqueue_entry(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<QueueChange>), ServerError> {
    let handle = state.registry.get(&TeacherId::new(teacher_id)).await?;
    let change = handle
        .enqueue(QueueEntry::waiting(req.id, req.display_name))
        .await?;
    Ok((StatusCode::CREATED, Json(change)))
}

pub async fn remove_entry(
    State(state): State<AppState>,
    Path((teacher_id, entry_id)): Path<(String, String)>,
) -> Result<Json<QueueChange>, ServerError> {
    let handle = state.registry.get(&TeacherId::new(teacher_id)).await?;
    let change = handle.remove(EntryId::new(entry_id)).await?;
    Ok(Json(change))
}

pub async fn entry_position(
    State(state): State<AppState>,
    Path((teacher_id, entry_id)): Path<(String, String)>,
) -> Result<Json<PositionResponse>, ServerError> {
    let snapshot = state
        .registry
        .get(&TeacherId::new(teacher_id))
        .await?
        .snapshot();
    let entry_id = EntryId::new(entry_id);
    let parties_ahead = snapshot
        .queue
        .position_of(&entry_id)
        .ok_or_else(|| conference_queue::QueueError::UnknownEntry(entry_id.clone()))?;
    let status = snapshot.queue.entries()[parties_ahead].status;
    Ok(Json(PositionResponse {
        entry_id,
        status,
        parties_ahead,
    }))
}
