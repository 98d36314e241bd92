//! Append-only task history.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use tasktide_shared::{TaskHistoryEntry, TaskId, TaskSnapshot, UserId};

use crate::convert::{parse_enum, parse_json, parse_ts, parse_uuid, ts};
use crate::database::Database;
use crate::error::Result;

const HISTORY_COLUMNS: &str = "id, task_id, action, previous_state, user_id, timestamp";

impl Database {
    pub fn append_history(&self, entry: &TaskHistoryEntry) -> Result<()> {
        let snapshot = entry
            .previous_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn().execute(
            "INSERT INTO task_history (id, task_id, action, previous_state, user_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id.to_string(),
                entry.task_id.to_string(),
                entry.action.as_str(),
                snapshot,
                entry.user_id.to_string(),
                ts(&entry.timestamp),
            ],
        )?;
        Ok(())
    }

    /// The newest entry `actor` recorded for `task_id`.
    pub fn latest_history_for(&self, task_id: TaskId, actor: UserId) -> Result<Option<TaskHistoryEntry>> {
        let entry = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {HISTORY_COLUMNS} FROM task_history
                     WHERE task_id = ?1 AND user_id = ?2
                     ORDER BY timestamp DESC, rowid DESC
                     LIMIT 1"
                ),
                params![task_id.to_string(), actor.to_string()],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Full history of a task, newest first.
    pub fn list_history(&self, task_id: TaskId) -> Result<Vec<TaskHistoryEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history
             WHERE task_id = ?1
             ORDER BY timestamp DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![task_id.to_string()], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn delete_history_entry(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM task_history WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskHistoryEntry> {
    let id_str: String = row.get(0)?;
    let task_str: String = row.get(1)?;
    let action_str: String = row.get(2)?;
    let snapshot_json: Option<String> = row.get(3)?;
    let user_str: String = row.get(4)?;
    let ts_str: String = row.get(5)?;

    Ok(TaskHistoryEntry {
        id: parse_uuid(0, &id_str)?,
        task_id: TaskId(parse_uuid(1, &task_str)?),
        action: parse_enum(2, &action_str)?,
        previous_state: snapshot_json
            .map(|s| parse_json::<TaskSnapshot>(3, &s))
            .transpose()?,
        user_id: UserId(parse_uuid(4, &user_str)?),
        timestamp: parse_ts(5, &ts_str)?,
    })
}
