use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use game_core::GameError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] GameError),
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("invalid game code")]
    InvalidGameCode,
    #[error("already a participant")]
    AlreadyParticipant,
    #[error("gift submission deadline has passed")]
    DeadlinePassed,
    #[error("gifts cannot change after the game has started")]
    SubmissionsClosed,
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Core(err) => err.kind(),
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidGameCode => "invalid_game_code",
            ServiceError::AlreadyParticipant => "already_participant",
            ServiceError::DeadlinePassed => "deadline_passed",
            ServiceError::SubmissionsClosed => "submissions_closed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Core(err) => match err {
                GameError::NotFound(_) => StatusCode::NOT_FOUND,
                GameError::Unauthorized => StatusCode::UNAUTHORIZED,
                GameError::Forbidden | GameError::NotYourTurn => StatusCode::FORBIDDEN,
                GameError::AlreadyStarted | GameError::AlreadyEnded => StatusCode::CONFLICT,
                GameError::CodeGenerationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_REQUEST,
            },
            ServiceError::AlreadyParticipant | ServiceError::SubmissionsClosed => {
                StatusCode::CONFLICT
            }
            ServiceError::InvalidInput(_)
            | ServiceError::InvalidGameCode
            | ServiceError::DeadlinePassed => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (self.status(), body).into_response()
    }
}
