use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use conference_queue::{ErrorKind, QueueError, TeacherId};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("queue actor for {0} is gone")]
    ActorGone(TeacherId),
}

impl ServerError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Queue(e) => e.reason_code(),
            Self::ActorGone(_) => "unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Queue(e) => match e.kind() {
                ErrorKind::UnknownIdentifier => StatusCode::NOT_FOUND,
                ErrorKind::InvariantViolation => StatusCode::CONFLICT,
            },
            Self::ActorGone(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            reason: self.reason_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// JSON error payload shared by REST responses and WebSocket rejections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub reason: String,
    pub message: String,
}

impl From<&QueueError> for ErrorBody {
    fn from(err: &QueueError) -> Self {
        Self {
            reason: err.reason_code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
