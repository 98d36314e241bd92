use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use tasktide_shared::{NotificationKind, TaskId};
use tasktide_store::{Notification, StoreError};

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<NotificationKind>,
}

/// Record a notification addressed to the caller.
pub async fn send(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendRequest>,
) -> Result<(StatusCode, Json<Notification>), ServerError> {
    let message = req.message.trim();
    let kind = match req.kind {
        Some(kind) if !message.is_empty() => kind,
        _ => {
            return Err(ServerError::BadRequest(
                "Message and type are required".to_string(),
            ))
        }
    };

    let notification = Notification {
        id: Uuid::new_v4(),
        user_id: auth.id,
        task_id: req.task_id,
        message: message.to_string(),
        kind,
        is_read: false,
        sent_at: Utc::now(),
    };
    state.db()?.insert_notification(&notification)?;

    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Notification>>, ServerError> {
    Ok(Json(state.db()?.list_notifications(auth.id)?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ServerError> {
    let notification = state
        .db()?
        .mark_notification_read(id, auth.id)
        .map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound("Notification not found".to_string()),
            other => other.into(),
        })?;
    Ok(Json(notification))
}
