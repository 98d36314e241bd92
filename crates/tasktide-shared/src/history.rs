//! Task history and single-step undo.
//!
//! History is append-only. Undo looks at the newest entry for a task,
//! turns its snapshot back into a task and consumes the entry. There is no
//! redo: undoing again walks further back until an entry without a snapshot
//! is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::UndoError;
use crate::task::Task;
use crate::types::{HistoryAction, TaskId, TaskStatus, UserId};

/// A full prior copy of a task, kept in its JSON object form so that a
/// restore only touches the fields the snapshot actually carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskSnapshot(pub Map<String, Value>);

impl TaskSnapshot {
    pub fn capture(task: &Task) -> Self {
        match serde_json::to_value(task) {
            Ok(Value::Object(map)) => Self(map),
            // Task always serializes to an object
            _ => Self(Map::new()),
        }
    }

    /// Rebuild a task from the snapshot alone, forcing its id.
    pub fn into_task(mut self, id: TaskId) -> Result<Task, serde_json::Error> {
        self.0.insert("id".to_string(), serde_json::to_value(id)?);
        let mut task: Task = serde_json::from_value(Value::Object(self.0))?;
        reconcile_completion(&mut task);
        Ok(task)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHistoryEntry {
    pub id: Uuid,
    pub task_id: TaskId,
    pub action: HistoryAction,
    #[serde(default)]
    pub previous_state: Option<TaskSnapshot>,
    /// The acting user.
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl TaskHistoryEntry {
    pub fn record(
        task_id: TaskId,
        action: HistoryAction,
        previous_state: Option<TaskSnapshot>,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            action,
            previous_state,
            user_id,
            timestamp,
        }
    }
}

/// Overlay the snapshot onto `current`. Fields the snapshot carries replace
/// the current ones; everything else is kept. Identity and ownership always
/// stay those of `current`.
pub fn merge_snapshot(current: &Task, snapshot: &TaskSnapshot) -> Result<Task, serde_json::Error> {
    let mut fields = match serde_json::to_value(current)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in &snapshot.0 {
        fields.insert(key.clone(), value.clone());
    }
    fields.insert("id".to_string(), serde_json::to_value(current.id)?);
    fields.insert("userId".to_string(), serde_json::to_value(current.user_id)?);

    let mut task: Task = serde_json::from_value(Value::Object(fields))?;
    reconcile_completion(&mut task);
    Ok(task)
}

fn reconcile_completion(task: &mut Task) {
    match task.status {
        TaskStatus::Pending => task.completed_at = None,
        TaskStatus::Completed => {
            if task.completed_at.is_none() {
                task.completed_at = Some(task.updated_at);
            }
        }
    }
}

/// What the caller must persist to carry out an undo.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoPlan {
    /// Insert the task again under its original id.
    Recreate { task: Task, consumed_entry: Uuid },
    /// Overwrite the existing task.
    Restore { task: Task, consumed_entry: Uuid },
}

impl UndoPlan {
    pub fn task(&self) -> &Task {
        match self {
            UndoPlan::Recreate { task, .. } | UndoPlan::Restore { task, .. } => task,
        }
    }

    pub fn consumed_entry(&self) -> Uuid {
        match self {
            UndoPlan::Recreate { consumed_entry, .. } | UndoPlan::Restore { consumed_entry, .. } => {
                *consumed_entry
            }
        }
    }
}

/// Decide how to undo the newest history entry of a task.
///
/// `latest` is the newest entry for the task, `current` the task as it is
/// stored now (absent after a delete).
pub fn plan_undo(latest: Option<&TaskHistoryEntry>, current: Option<&Task>) -> Result<UndoPlan, UndoError> {
    let entry = latest.ok_or(UndoError::NothingToUndo)?;
    let snapshot = entry.previous_state.clone().ok_or(UndoError::NothingToUndo)?;

    if entry.action == HistoryAction::Deleted {
        let task = snapshot.into_task(entry.task_id)?;
        return Ok(UndoPlan::Recreate {
            task,
            consumed_entry: entry.id,
        });
    }

    let current = current.ok_or(UndoError::TaskMissing)?;
    let task = merge_snapshot(current, &snapshot)?;
    Ok(UndoPlan::Restore {
        task,
        consumed_entry: entry.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskUpdate};
    use crate::types::Priority;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap()
    }

    fn task() -> Task {
        let new = NewTask {
            title: "Plan trip".into(),
            description: "flights".into(),
            priority: Priority::Low,
            tags: vec!["travel".into()],
            ..Default::default()
        };
        Task::from_new(TaskId::new(), UserId::new(), new, now())
    }

    #[test]
    fn undo_delete_recreates_with_original_id() {
        let original = task();
        let entry = TaskHistoryEntry::record(
            original.id,
            HistoryAction::Deleted,
            Some(TaskSnapshot::capture(&original)),
            original.user_id,
            now(),
        );

        let plan = plan_undo(Some(&entry), None).unwrap();
        match &plan {
            UndoPlan::Recreate { task, consumed_entry } => {
                assert_eq!(task, &original);
                assert_eq!(*consumed_entry, entry.id);
            }
            other => panic!("expected recreate, got {other:?}"),
        }
    }

    #[test]
    fn undo_update_restores_prior_fields() {
        let before = task();
        let mut after = before.clone();
        let update: TaskUpdate =
            serde_json::from_str(r#"{"title":"Plan holiday","priority":"high"}"#).unwrap();
        update.apply(&mut after, now()).unwrap();

        let entry = TaskHistoryEntry::record(
            after.id,
            HistoryAction::Updated,
            Some(TaskSnapshot::capture(&before)),
            after.user_id,
            now(),
        );

        let plan = plan_undo(Some(&entry), Some(&after)).unwrap();
        assert!(matches!(plan, UndoPlan::Restore { .. }));
        assert_eq!(plan.task(), &before);
    }

    #[test]
    fn merge_keeps_fields_missing_from_snapshot() {
        let mut current = task();
        current.attachments = vec!["/uploads/a".into()];

        let mut partial = Map::new();
        partial.insert("title".into(), Value::String("Old title".into()));
        let merged = merge_snapshot(&current, &TaskSnapshot(partial)).unwrap();

        assert_eq!(merged.title, "Old title");
        assert_eq!(merged.description, "flights");
        assert_eq!(merged.attachments, vec!["/uploads/a".to_string()]);
    }

    #[test]
    fn merge_never_changes_identity() {
        let current = task();
        let other = task();
        let merged = merge_snapshot(&current, &TaskSnapshot::capture(&other)).unwrap();
        assert_eq!(merged.id, current.id);
        assert_eq!(merged.user_id, current.user_id);
    }

    #[test]
    fn nothing_to_undo_without_entry_or_snapshot() {
        let t = task();
        assert!(matches!(plan_undo(None, Some(&t)), Err(UndoError::NothingToUndo)));

        let bare = TaskHistoryEntry::record(t.id, HistoryAction::Completed, None, t.user_id, now());
        assert!(matches!(
            plan_undo(Some(&bare), Some(&t)),
            Err(UndoError::NothingToUndo)
        ));
    }

    #[test]
    fn restore_without_current_task_fails() {
        let t = task();
        let entry = TaskHistoryEntry::record(
            t.id,
            HistoryAction::Updated,
            Some(TaskSnapshot::capture(&t)),
            t.user_id,
            now(),
        );
        assert!(matches!(plan_undo(Some(&entry), None), Err(UndoError::TaskMissing)));
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let t = task();
        let mut junk = Map::new();
        junk.insert("status".into(), Value::String("archived".into()));
        let entry = TaskHistoryEntry::record(
            t.id,
            HistoryAction::Deleted,
            Some(TaskSnapshot(junk)),
            t.user_id,
            now(),
        );
        assert!(matches!(
            plan_undo(Some(&entry), None),
            Err(UndoError::CorruptSnapshot(_))
        ));
    }
}
