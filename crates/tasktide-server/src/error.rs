use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tasktide_shared::{UndoError, ValidationError};
use tasktide_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("File too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Attachment storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn task_not_found() -> Self {
        ServerError::NotFound("Task not found".to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::Storage(_) => {
                tracing::error!(error = %self, "attachment storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Attachment storage error".to_string())
            }
            ServerError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("Not found".to_string()),
            StoreError::Duplicate("email") => ServerError::Conflict("User already exists".to_string()),
            StoreError::Duplicate(what) => ServerError::Conflict(format!("Duplicate {what}")),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<UndoError> for ServerError {
    fn from(e: UndoError) -> Self {
        match e {
            UndoError::NothingToUndo => ServerError::BadRequest(e.to_string()),
            UndoError::TaskMissing => ServerError::task_not_found(),
            UndoError::CorruptSnapshot(_) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationError> for ServerError {
    fn from(e: ValidationError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (ServerError::task_not_found(), StatusCode::NOT_FOUND),
            (UndoError::NothingToUndo.into(), StatusCode::BAD_REQUEST),
            (StoreError::Duplicate("email").into(), StatusCode::CONFLICT),
            (ValidationError::MissingTitle.into(), StatusCode::BAD_REQUEST),
            (
                ServerError::PayloadTooLarge { size: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (ServerError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
