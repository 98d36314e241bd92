//! Task endpoints.
//!
//! Handlers lock the store only for their synchronous part; every write of a
//! task and of its history entry happens under one lock but without a
//! surrounding transaction.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tasktide_shared::analytics::{self, Suggestions};
use tasktide_shared::constants::DEFAULT_PAGE_SIZE;
use tasktide_shared::gamification::completion_award;
use tasktide_shared::history::plan_undo;
use tasktide_shared::recurrence::next_occurrence;
use tasktide_shared::urgency::{prioritize, ScoredTask};
use tasktide_shared::{
    HistoryAction, NewTask, Priority, RecurringType, Task, TaskHistoryEntry, TaskId, TaskSnapshot,
    TaskStatus, TaskUpdate, UndoPlan, UserId,
};
use tasktide_store::{Database, StoreError, TaskFilter, TaskSort};

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;

/// Upper bound on `limit` for paged listings.
const MAX_PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

fn load_task(db: &Database, id: TaskId) -> Result<Option<Task>, ServerError> {
    match db.get_task(id) {
        Ok(task) => Ok(Some(task)),
        Err(StoreError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The task if `user` may read it.
fn load_visible(db: &Database, id: TaskId, user: UserId) -> Result<Task, ServerError> {
    match load_task(db, id)? {
        Some(task) if task.is_visible_to(user) => Ok(task),
        _ => Err(ServerError::task_not_found()),
    }
}

/// The task if `user` owns it. Users it is shared with get 403, everyone
/// else 404.
fn load_owned(db: &Database, id: TaskId, user: UserId) -> Result<Task, ServerError> {
    let task = load_visible(db, id, user)?;
    if task.user_id != user {
        return Err(ServerError::Forbidden(
            "Only the task owner can modify it".to_string(),
        ));
    }
    Ok(task)
}

fn record(
    db: &Database,
    task: &Task,
    action: HistoryAction,
    previous: Option<TaskSnapshot>,
    actor: UserId,
    at: DateTime<Utc>,
) -> Result<(), ServerError> {
    db.append_history(&TaskHistoryEntry::record(task.id, action, previous, actor, at))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_date_param(field: &str, raw: &str) -> Result<DateTime<Utc>, ServerError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
        .map_err(|_| ServerError::BadRequest(format!("Invalid {field}: {raw}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub tags: Option<String>,
    pub sort: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub tasks: Vec<ScoredTask>,
    pub total: usize,
    pub total_pages: usize,
    pub current_page: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub tags: Option<String>,
    pub due_date_from: Option<String>,
    pub due_date_to: Option<String>,
    pub is_recurring: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(mut new): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ServerError> {
    new.validate()?;
    let now = Utc::now();
    let task = Task::from_new(TaskId::new(), auth.id, new, now);

    let db = state.db()?;
    db.insert_task(&task)?;
    record(&db, &task, HistoryAction::Created, None, auth.id, now)?;

    debug!(task = %task.id, user = %auth.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// Owned and shared tasks, filtered, sorted and paged.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskPage>, ServerError> {
    let by_urgency = query.sort.as_deref() == Some("urgency");
    let filter = TaskFilter {
        status: query.status,
        priority: query.priority,
        tags: split_tags(query.tags.as_deref()),
        include_shared: true,
        sort: match query.sort.as_deref() {
            Some("dueDate") => TaskSort::DueDate,
            Some("priority") => TaskSort::Priority,
            _ => TaskSort::Newest,
        },
        ..Default::default()
    };

    let tasks = state.db()?.list_tasks(auth.id, &filter)?;
    let now = Utc::now();
    let scored: Vec<ScoredTask> = if by_urgency {
        prioritize(tasks, now)
    } else {
        tasks.into_iter().map(|t| ScoredTask::score(t, now)).collect()
    };

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let total = scored.len();
    let tasks = scored
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Ok(Json(TaskPage {
        tasks,
        total,
        total_pages: total.div_ceil(limit),
        current_page: page,
    }))
}

pub async fn search_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Task>>, ServerError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err(ServerError::BadRequest("Search query is required".to_string()));
    }
    let filter = TaskFilter {
        text: Some(q.to_string()),
        ..Default::default()
    };
    Ok(Json(state.db()?.list_tasks(auth.id, &filter)?))
}

pub async fn filter_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Task>>, ServerError> {
    let filter = TaskFilter {
        status: query.status,
        priority: query.priority,
        tags: split_tags(query.tags.as_deref()),
        due_from: query
            .due_date_from
            .as_deref()
            .map(|s| parse_date_param("dueDateFrom", s))
            .transpose()?,
        due_to: query
            .due_date_to
            .as_deref()
            .map(|s| parse_date_param("dueDateTo", s))
            .transpose()?,
        is_recurring: query.is_recurring.as_deref().map(|v| v == "true"),
        ..Default::default()
    };
    Ok(Json(state.db()?.list_tasks(auth.id, &filter)?))
}

pub async fn suggestions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Suggestions>, ServerError> {
    let tasks = state.db()?.list_owned_tasks(auth.id)?;
    let now = Utc::now();
    let today = state.today(now);
    Ok(Json(analytics::suggestions(&tasks, now, today.start)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, ServerError> {
    let task = load_visible(&*state.db()?, id, auth.id)?;
    Ok(Json(task))
}

pub async fn task_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
) -> Result<Json<Vec<TaskHistoryEntry>>, ServerError> {
    let db = state.db()?;
    load_visible(&db, id, auth.id)?;
    Ok(Json(db.list_history(id)?))
}

// ---------------------------------------------------------------------------
// Update / delete
// ---------------------------------------------------------------------------

pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>, ServerError> {
    let now = Utc::now();
    let db = state.db()?;
    let mut task = load_owned(&db, id, auth.id)?;
    let previous = TaskSnapshot::capture(&task);

    update.apply(&mut task, now)?;
    db.save_task(&task)?;
    record(&db, &task, HistoryAction::Updated, Some(previous), auth.id, now)?;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let now = Utc::now();
    let db = state.db()?;
    let task = load_owned(&db, id, auth.id)?;

    db.delete_task(task.id)?;
    record(
        &db,
        &task,
        HistoryAction::Deleted,
        Some(TaskSnapshot::capture(&task)),
        auth.id,
        now,
    )?;

    info!(task = %task.id, user = %auth.id, "Task deleted");
    Ok(Json(serde_json::json!({ "message": "Task deleted successfully" })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    #[serde(flatten)]
    pub task: Task,
    /// The follow-up occurrence spawned by completing a recurring task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_occurrence: Option<Task>,
}

/// Flip pending/completed, settle points and streak, and spawn the next
/// occurrence of a recurring task.
pub async fn toggle_complete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
) -> Result<Json<ToggleResponse>, ServerError> {
    let now = Utc::now();
    let today = state.today(now);
    let db = state.db()?;

    let mut task = load_owned(&db, id, auth.id)?;
    let was = task.toggle_status(now);
    db.save_task(&task)?;

    let completed_now = was == TaskStatus::Pending;
    let (elsewhere_today, yesterday) = if completed_now {
        let elsewhere =
            db.has_completion_between(auth.id, today.start, today.end(), Some(task.id))?;
        let yesterday = !elsewhere
            && db.has_completion_between(auth.id, today.yesterday_start(), today.start, Some(task.id))?;
        (elsewhere, yesterday)
    } else {
        (false, false)
    };
    let award = completion_award(was, task.status, task.priority, elsewhere_today, yesterday);
    db.apply_award(auth.id, award.points_delta, award.streak)?;
    record(&db, &task, HistoryAction::Completed, None, auth.id, now)?;

    let mut spawned = None;
    if completed_now {
        if let Some(new) = next_occurrence(&task) {
            let next = Task::from_new(TaskId::new(), auth.id, new, now);
            db.insert_task(&next)?;
            record(&db, &next, HistoryAction::Created, None, auth.id, now)?;
            debug!(task = %task.id, next = %next.id, "Spawned next occurrence");
            spawned = Some(next);
        }
    }

    debug!(
        task = %task.id,
        status = %task.status,
        points = award.points_delta,
        streak = ?award.streak,
        "Task toggled"
    );
    Ok(Json(ToggleResponse {
        task,
        next_occurrence: spawned,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRequest {
    pub recurring_type: Option<String>,
}

pub async fn setup_recurring(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
    Json(req): Json<RecurringRequest>,
) -> Result<Json<Task>, ServerError> {
    let kind: RecurringType = req
        .recurring_type
        .as_deref()
        .ok_or_else(|| ServerError::BadRequest("Invalid recurring type".to_string()))?
        .parse()?;

    let now = Utc::now();
    let db = state.db()?;
    let mut task = load_owned(&db, id, auth.id)?;
    task.make_recurring(kind, now);
    db.save_task(&task)?;
    record(&db, &task, HistoryAction::Updated, None, auth.id, now)?;

    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    #[serde(default)]
    pub user_ids: Vec<UserId>,
}

pub async fn share_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
    Json(req): Json<ShareRequest>,
) -> Result<Json<Task>, ServerError> {
    if req.user_ids.is_empty() {
        return Err(ServerError::BadRequest("User IDs array is required".to_string()));
    }

    let now = Utc::now();
    let db = state.db()?;
    let mut task = load_owned(&db, id, auth.id)?;

    for user in &req.user_ids {
        match db.get_user(*user) {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(ServerError::BadRequest(format!("Unknown user: {user}")));
            }
            Err(e) => return Err(e.into()),
        }
    }

    task.share_with(req.user_ids.into_iter().filter(|u| *u != auth.id));
    task.updated_at = now;
    db.save_task(&task)?;
    record(&db, &task, HistoryAction::Updated, None, auth.id, now)?;

    info!(task = %task.id, shared = task.shared_with.len(), "Task shared");
    Ok(Json(task))
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

pub async fn upload_attachments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
    mut multipart: Multipart,
) -> Result<Json<Task>, ServerError> {
    load_owned(&*state.db()?, id, auth.id)?;

    let max_files = state.config.max_files_per_upload;
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        if files.len() >= max_files {
            return Err(ServerError::BadRequest(format!(
                "At most {max_files} files per upload"
            )));
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Failed to read file: {e}")))?;
        state.attachments.check_size(data.len())?;
        files.push((file_name, data));
    }

    if files.is_empty() {
        return Err(ServerError::BadRequest("No files uploaded".to_string()));
    }

    let mut stored = Vec::with_capacity(files.len());
    for (name, data) in &files {
        match state.attachments.store(name.as_deref(), data).await {
            Ok(reference) => stored.push(reference),
            Err(e) => {
                discard(&state, &stored).await;
                return Err(e);
            }
        }
    }

    let result = attach(&state, id, auth.id, &stored);
    if result.is_err() {
        discard(&state, &stored).await;
    }
    let task = result?;

    info!(task = %task.id, files = stored.len(), "Attachments uploaded");
    Ok(Json(task))
}

fn attach(state: &AppState, id: TaskId, owner: UserId, references: &[String]) -> Result<Task, ServerError> {
    let now = Utc::now();
    let db = state.db()?;
    let mut task = load_owned(&db, id, owner)?;
    task.attachments.extend(references.iter().cloned());
    task.updated_at = now;
    db.save_task(&task)?;
    record(&db, &task, HistoryAction::Updated, None, owner, now)?;
    Ok(task)
}

async fn discard(state: &AppState, references: &[String]) {
    for reference in references {
        if let Err(e) = state.attachments.remove(reference).await {
            warn!(reference = %reference, error = %e, "Failed to clean up attachment");
        }
    }
}

// ---------------------------------------------------------------------------
// Bulk
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
}

pub async fn bulk_complete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let modified = state
        .db()?
        .bulk_complete(auth.id, &req.task_ids, Utc::now())?;
    Ok(Json(serde_json::json!({
        "message": "Tasks marked as completed",
        "modified": modified,
    })))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let deleted = state.db()?.bulk_delete(auth.id, &req.task_ids)?;
    info!(user = %auth.id, deleted, "Bulk delete");
    Ok(Json(serde_json::json!({
        "message": "Tasks deleted successfully",
        "deleted": deleted,
    })))
}

// ---------------------------------------------------------------------------
// Undo
// ---------------------------------------------------------------------------

/// Replay the caller's newest history entry for the task and consume it.
pub async fn undo_last_action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, ServerError> {
    let db = state.db()?;
    let latest = db.latest_history_for(id, auth.id)?;
    let current = load_task(&db, id)?;
    if current.as_ref().is_some_and(|t| t.user_id != auth.id) {
        return Err(ServerError::Forbidden(
            "Only the task owner can modify it".to_string(),
        ));
    }

    let plan = plan_undo(latest.as_ref(), current.as_ref())?;
    match &plan {
        UndoPlan::Recreate { task, .. } if current.is_none() => db.insert_task(task)?,
        UndoPlan::Recreate { task, .. } | UndoPlan::Restore { task, .. } => {
            db.save_task(task)?;
        }
    }
    db.delete_history_entry(plan.consumed_entry())?;

    info!(task = %id, user = %auth.id, "Undid last action");
    Ok(Json(plan.task().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_param_is_split_and_trimmed() {
        assert_eq!(split_tags(Some("work, home,,")), vec!["work", "home"]);
        assert!(split_tags(None).is_empty());
    }

    #[test]
    fn date_params_accept_day_or_timestamp() {
        assert_eq!(
            parse_date_param("dueDateFrom", "2024-05-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date_param("dueDateTo", "2024-05-01T12:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
        );
        assert!(matches!(
            parse_date_param("dueDateTo", "soon"),
            Err(ServerError::BadRequest(_))
        ));
    }
}
