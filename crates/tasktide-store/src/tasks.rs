//! CRUD and query operations for [`Task`] records.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use tasktide_shared::{Priority, Task, TaskId, TaskStatus, UserId};

use crate::convert::{parse_enum, parse_json, parse_opt_ts, parse_ts, parse_uuid, ts};
use crate::database::Database;
use crate::error::{not_found, Result};

const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, tags, due_date, \
     is_recurring, recurring_type, completed_at, shared_with, attachments, created_at, updated_at";

/// Ordering applied by [`Database::list_tasks`]. Urgency ordering is not a
/// stored property and is applied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskSort {
    /// Most recently created first.
    #[default]
    Newest,
    /// Earliest due date first; undated tasks lead.
    DueDate,
    /// High before medium before low.
    Priority,
}

/// Filters for [`Database::list_tasks`]. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    /// Matches tasks carrying any of these tags.
    pub tags: Vec<String>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub is_recurring: Option<bool>,
    /// Case-insensitive substring of title or description.
    pub text: Option<String>,
    /// Also return tasks shared with the viewer.
    pub include_shared: bool,
    pub sort: TaskSort,
}

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    pub fn insert_task(&self, task: &Task) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                task.id.to_string(),
                task.user_id.to_string(),
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                serde_json::to_string(&task.tags)?,
                task.due_date.as_ref().map(ts),
                task.is_recurring,
                task.recurring_type.map(|r| r.as_str()),
                task.completed_at.as_ref().map(ts),
                serde_json::to_string(&task.shared_with)?,
                serde_json::to_string(&task.attachments)?,
                ts(&task.created_at),
                ts(&task.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Overwrite every stored field of an existing task. Returns `false` if
    /// no task has that id.
    pub fn save_task(&self, task: &Task) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE tasks SET
                 user_id = ?2, title = ?3, description = ?4, status = ?5, priority = ?6,
                 tags = ?7, due_date = ?8, is_recurring = ?9, recurring_type = ?10,
                 completed_at = ?11, shared_with = ?12, attachments = ?13,
                 created_at = ?14, updated_at = ?15
             WHERE id = ?1",
            params![
                task.id.to_string(),
                task.user_id.to_string(),
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                serde_json::to_string(&task.tags)?,
                task.due_date.as_ref().map(ts),
                task.is_recurring,
                task.recurring_type.map(|r| r.as_str()),
                task.completed_at.as_ref().map(ts),
                serde_json::to_string(&task.shared_with)?,
                serde_json::to_string(&task.attachments)?,
                ts(&task.created_at),
                ts(&task.updated_at),
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        self.conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
                row_to_task,
            )
            .map_err(not_found)
    }

    /// All tasks owned by `owner`, newest first.
    pub fn list_owned_tasks(&self, owner: UserId) -> Result<Vec<Task>> {
        self.list_tasks(owner, &TaskFilter::default())
    }

    /// Tasks visible to `viewer` that match `filter`.
    pub fn list_tasks(&self, viewer: UserId, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut values: Vec<Value> = vec![Value::Text(viewer.to_string())];
        let mut bind = |v: Value| {
            values.push(v);
            format!("?{}", values.len())
        };

        let mut clauses = vec![if filter.include_shared {
            "(user_id = ?1 OR EXISTS (SELECT 1 FROM json_each(tasks.shared_with) WHERE json_each.value = ?1))"
                .to_string()
        } else {
            "user_id = ?1".to_string()
        }];

        if let Some(status) = filter.status {
            clauses.push(format!("status = {}", bind(Value::Text(status.as_str().into()))));
        }
        if let Some(priority) = filter.priority {
            clauses.push(format!("priority = {}", bind(Value::Text(priority.as_str().into()))));
        }
        if !filter.tags.is_empty() {
            let placeholders: Vec<String> = filter
                .tags
                .iter()
                .map(|t| bind(Value::Text(t.clone())))
                .collect();
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(tasks.tags) WHERE json_each.value IN ({}))",
                placeholders.join(", ")
            ));
        }
        if let Some(from) = filter.due_from {
            clauses.push(format!("due_date >= {}", bind(Value::Text(ts(&from)))));
        }
        if let Some(to) = filter.due_to {
            clauses.push(format!("due_date <= {}", bind(Value::Text(ts(&to)))));
        }
        if let Some(recurring) = filter.is_recurring {
            clauses.push(format!("is_recurring = {}", bind(Value::Integer(i64::from(recurring)))));
        }

        let order = match filter.sort {
            TaskSort::Newest => "created_at DESC, rowid DESC",
            TaskSort::DueDate => "due_date ASC, created_at DESC",
            TaskSort::Priority => {
                "CASE priority WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END DESC, created_at DESC"
            }
        };

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {} ORDER BY {order}",
            clauses.join(" AND ")
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_task)?;

        // SQLite's LIKE only folds ASCII, so text matching happens here.
        let needle = filter.text.as_deref().map(str::to_lowercase);
        let mut tasks = Vec::new();
        for row in rows {
            let task = row?;
            if needle.as_deref().map_or(true, |n| mentions(&task, n)) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Whether `owner` completed any task in `[from, to)`, optionally
    /// ignoring one task.
    pub fn has_completion_between(
        &self,
        owner: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude: Option<TaskId>,
    ) -> Result<bool> {
        let found: bool = self.conn().query_row(
            "SELECT EXISTS (
                 SELECT 1 FROM tasks
                 WHERE user_id = ?1 AND status = 'completed'
                   AND completed_at >= ?2 AND completed_at < ?3
                   AND (?4 IS NULL OR id != ?4)
             )",
            params![
                owner.to_string(),
                ts(&from),
                ts(&to),
                exclude.map(|id| id.to_string()),
            ],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Bulk / delete
    // ------------------------------------------------------------------

    /// Mark the owner's pending tasks among `ids` completed. Returns how many
    /// changed.
    pub fn bulk_complete(&self, owner: UserId, ids: &[TaskId], now: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut values = vec![Value::Text(owner.to_string()), Value::Text(ts(&now))];
        let placeholders = id_placeholders(&mut values, ids);
        let affected = self.conn().execute(
            &format!(
                "UPDATE tasks SET status = 'completed', completed_at = ?2, updated_at = ?2
                 WHERE user_id = ?1 AND status = 'pending' AND id IN ({placeholders})"
            ),
            params_from_iter(values.iter()),
        )?;
        Ok(affected)
    }

    /// Delete the owner's tasks among `ids`. Returns how many were removed.
    pub fn bulk_delete(&self, owner: UserId, ids: &[TaskId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut values = vec![Value::Text(owner.to_string())];
        let placeholders = id_placeholders(&mut values, ids);
        let affected = self.conn().execute(
            &format!("DELETE FROM tasks WHERE user_id = ?1 AND id IN ({placeholders})"),
            params_from_iter(values.iter()),
        )?;
        Ok(affected)
    }

    /// Delete a task by id.  Returns `true` if a row was deleted.
    pub fn delete_task(&self, id: TaskId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id_placeholders(values: &mut Vec<Value>, ids: &[TaskId]) -> String {
    let mut placeholders = Vec::with_capacity(ids.len());
    for id in ids {
        values.push(Value::Text(id.to_string()));
        placeholders.push(format!("?{}", values.len()));
    }
    placeholders.join(", ")
}

/// Case-insensitive substring match on title or description. `needle` is
/// already lowercased.
fn mentions(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle) || task.description.to_lowercase().contains(needle)
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let status_str: String = row.get(4)?;
    let priority_str: String = row.get(5)?;
    let tags_json: String = row.get(6)?;
    let recurring_str: Option<String> = row.get(9)?;
    let shared_json: String = row.get(11)?;
    let attachments_json: String = row.get(12)?;
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;

    Ok(Task {
        id: TaskId(parse_uuid(0, &id_str)?),
        user_id: UserId(parse_uuid(1, &user_str)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status: parse_enum(4, &status_str)?,
        priority: parse_enum(5, &priority_str)?,
        tags: parse_json(6, &tags_json)?,
        due_date: parse_opt_ts(7, row.get(7)?)?,
        is_recurring: row.get(8)?,
        recurring_type: recurring_str.map(|s| parse_enum(9, &s)).transpose()?,
        completed_at: parse_opt_ts(10, row.get(10)?)?,
        shared_with: parse_json(11, &shared_json)?,
        attachments: parse_json(12, &attachments_json)?,
        created_at: parse_ts(13, &created_str)?,
        updated_at: parse_ts(14, &updated_str)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::test_support::temp_db;
    use crate::error::StoreError;
    use crate::users::tests::sample_user;
    use chrono::{Duration, TimeZone};
    use tasktide_shared::{NewTask, RecurringType};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap()
    }

    pub(crate) fn make_task(owner: UserId, title: &str, offset_mins: i64) -> Task {
        let new = NewTask {
            title: title.into(),
            ..Default::default()
        };
        Task::from_new(TaskId::new(), owner, new, base() + Duration::minutes(offset_mins))
    }

    fn setup() -> (Database, tempfile::TempDir, UserId, UserId) {
        let (db, dir) = temp_db();
        let a = sample_user("a@example.com", "A");
        let b = sample_user("b@example.com", "B");
        db.create_user(&a).unwrap();
        db.create_user(&b).unwrap();
        (db, dir, a.id, b.id)
    }

    #[test]
    fn insert_get_save_round_trip() {
        let (db, _dir, owner, other) = setup();
        let mut task = make_task(owner, "Draft", 0);
        task.tags = vec!["work".into()];
        task.due_date = Some(base() + Duration::days(2));
        task.make_recurring(RecurringType::Monthly, base());
        task.share_with([other]);
        db.insert_task(&task).unwrap();

        assert_eq!(db.get_task(task.id).unwrap(), task);

        task.set_status(TaskStatus::Completed, base() + Duration::hours(1));
        task.attachments.push("/uploads/x".into());
        assert!(db.save_task(&task).unwrap());
        assert_eq!(db.get_task(task.id).unwrap(), task);

        assert!(db.delete_task(task.id).unwrap());
        assert!(matches!(db.get_task(task.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn list_includes_shared_only_when_asked() {
        let (db, _dir, a, b) = setup();
        let mine = make_task(a, "mine", 0);
        let mut theirs = make_task(b, "theirs", 1);
        theirs.share_with([a]);
        db.insert_task(&mine).unwrap();
        db.insert_task(&theirs).unwrap();
        db.insert_task(&make_task(b, "private", 2)).unwrap();

        let own = db.list_owned_tasks(a).unwrap();
        assert_eq!(own.len(), 1);

        let filter = TaskFilter {
            include_shared: true,
            ..Default::default()
        };
        let titles: Vec<_> = db
            .list_tasks(a, &filter)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["theirs", "mine"]);
    }

    #[test]
    fn filters_narrow_results() {
        let (db, _dir, a, _) = setup();
        let mut t1 = make_task(a, "Buy milk", 0);
        t1.tags = vec!["home".into()];
        t1.priority = Priority::High;
        t1.due_date = Some(base() + Duration::days(1));
        let mut t2 = make_task(a, "Quarterly report", 1);
        t2.tags = vec!["work".into()];
        t2.description = "numbers for the MILK board".into();
        t2.due_date = Some(base() + Duration::days(10));
        let t3 = make_task(a, "Call mom", 2);
        for t in [&t1, &t2, &t3] {
            db.insert_task(t).unwrap();
        }

        let by_tag = TaskFilter {
            tags: vec!["home".into(), "garden".into()],
            ..Default::default()
        };
        assert_eq!(db.list_tasks(a, &by_tag).unwrap(), vec![t1.clone()]);

        let by_text = TaskFilter {
            text: Some("milk".into()),
            ..Default::default()
        };
        assert_eq!(db.list_tasks(a, &by_text).unwrap().len(), 2);

        let by_due = TaskFilter {
            due_from: Some(base()),
            due_to: Some(base() + Duration::days(5)),
            ..Default::default()
        };
        assert_eq!(db.list_tasks(a, &by_due).unwrap(), vec![t1.clone()]);

        let by_priority = TaskFilter {
            priority: Some(Priority::High),
            ..Default::default()
        };
        assert_eq!(db.list_tasks(a, &by_priority).unwrap(), vec![t1.clone()]);

        let sorted = TaskFilter {
            sort: TaskSort::DueDate,
            ..Default::default()
        };
        let titles: Vec<_> = db
            .list_tasks(a, &sorted)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Call mom", "Buy milk", "Quarterly report"]);
    }

    #[test]
    fn text_search_folds_non_ascii_case() {
        let (db, _dir, a, _) = setup();
        let accented = make_task(a, "Lettre à Émile", 0);
        let plain = make_task(a, "Budget 100%", 1);
        db.insert_task(&accented).unwrap();
        db.insert_task(&plain).unwrap();

        let folded = TaskFilter {
            text: Some("émile".into()),
            ..Default::default()
        };
        assert_eq!(db.list_tasks(a, &folded).unwrap(), vec![accented]);

        // no wildcard semantics
        let percent = TaskFilter {
            text: Some("%".into()),
            ..Default::default()
        };
        assert_eq!(db.list_tasks(a, &percent).unwrap(), vec![plain]);
    }

    #[test]
    fn priority_sort_is_semantic() {
        let (db, _dir, a, _) = setup();
        for (i, p) in [Priority::Medium, Priority::High, Priority::Low].into_iter().enumerate() {
            let mut t = make_task(a, p.as_str(), i as i64);
            t.priority = p;
            db.insert_task(&t).unwrap();
        }
        let filter = TaskFilter {
            sort: TaskSort::Priority,
            ..Default::default()
        };
        let order: Vec<_> = db
            .list_tasks(a, &filter)
            .unwrap()
            .into_iter()
            .map(|t| t.priority)
            .collect();
        assert_eq!(order, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn bulk_operations_respect_owner() {
        let (db, _dir, a, b) = setup();
        let t1 = make_task(a, "one", 0);
        let t2 = make_task(a, "two", 1);
        let foreign = make_task(b, "foreign", 2);
        for t in [&t1, &t2, &foreign] {
            db.insert_task(t).unwrap();
        }

        let ids = [t1.id, t2.id, foreign.id];
        assert_eq!(db.bulk_complete(a, &ids, base()).unwrap(), 2);
        let done = db.get_task(t1.id).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.completed_at, Some(base()));
        assert_eq!(db.get_task(foreign.id).unwrap().status, TaskStatus::Pending);

        assert_eq!(db.bulk_delete(a, &ids).unwrap(), 2);
        assert!(db.get_task(foreign.id).is_ok());
    }

    #[test]
    fn completion_window_query() {
        let (db, _dir, a, _) = setup();
        let mut t = make_task(a, "done", 0);
        t.set_status(TaskStatus::Completed, base());
        db.insert_task(&t).unwrap();

        let day = Duration::days(1);
        let start = base() - Duration::hours(10);
        assert!(db.has_completion_between(a, start, start + day, None).unwrap());
        assert!(!db.has_completion_between(a, start, start + day, Some(t.id)).unwrap());
        assert!(!db.has_completion_between(a, start - day, start, None).unwrap());
    }
}
