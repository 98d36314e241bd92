use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use tasktide_shared::constants::{MIN_USER_SEARCH_LEN, USER_SEARCH_LIMIT};
use tasktide_store::UserSummary;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub q: Option<String>,
}

/// Find other users by name or email, for sharing.
pub async fn search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<Vec<UserSummary>>, ServerError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.chars().count() < MIN_USER_SEARCH_LEN {
        return Err(ServerError::BadRequest(format!(
            "Search query must be at least {MIN_USER_SEARCH_LEN} characters"
        )));
    }
    let users = state.db()?.search_users(q, auth.id, USER_SEARCH_LIMIT)?;
    Ok(Json(users))
}
