//! Read-only reports over the caller's own tasks.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use tasktide_shared::analytics::{self, Bottlenecks, Overview, Productivity, StreakReport};
use tasktide_shared::constants::DEFAULT_PRODUCTIVITY_DAYS;
use tasktide_shared::gamification::{self, GamificationSummary};

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;

const MAX_PRODUCTIVITY_DAYS: u32 = 366;

pub async fn overview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Overview>, ServerError> {
    let tasks = state.db()?.list_owned_tasks(auth.id)?;
    let today = state.today(Utc::now());
    Ok(Json(analytics::overview(&tasks, today.start)))
}

#[derive(Debug, Deserialize)]
pub struct ProductivityQuery {
    pub days: Option<u32>,
}

pub async fn productivity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ProductivityQuery>,
) -> Result<Json<Productivity>, ServerError> {
    let days = query
        .days
        .unwrap_or(DEFAULT_PRODUCTIVITY_DAYS)
        .min(MAX_PRODUCTIVITY_DAYS);
    let tasks = state.db()?.list_owned_tasks(auth.id)?;
    let since = state.today(Utc::now()).start - Duration::days(i64::from(days));
    Ok(Json(analytics::productivity(
        &tasks,
        since,
        days,
        &state.day_offset(),
    )))
}

pub async fn streaks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<StreakReport>, ServerError> {
    let (tasks, stored_streak) = {
        let db = state.db()?;
        (db.list_owned_tasks(auth.id)?, db.get_user(auth.id)?.streak)
    };
    let today = state.today(Utc::now());
    Ok(Json(analytics::streak_report(
        &tasks,
        stored_streak,
        today.date,
        &state.day_offset(),
    )))
}

pub async fn bottlenecks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Bottlenecks>, ServerError> {
    let tasks = state.db()?.list_owned_tasks(auth.id)?;
    let today = state.today(Utc::now());
    Ok(Json(analytics::bottlenecks(&tasks, today.start)))
}

/// Display points, computed streak and earned achievements.
pub async fn gamification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<GamificationSummary>, ServerError> {
    let tasks = state.db()?.list_owned_tasks(auth.id)?;
    let today = state.today(Utc::now());
    Ok(Json(gamification::summarize(
        &tasks,
        today.date,
        &state.day_offset(),
    )))
}
