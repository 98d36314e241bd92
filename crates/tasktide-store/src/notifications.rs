use rusqlite::params;
use uuid::Uuid;

use tasktide_shared::{TaskId, UserId};

use crate::convert::{parse_enum, parse_ts, parse_uuid, ts};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str = "id, user_id, task_id, message, kind, is_read, sent_at";

impl Database {
    pub fn insert_notification(&self, n: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, user_id, task_id, message, kind, is_read, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                n.id.to_string(),
                n.user_id.to_string(),
                n.task_id.map(|t| t.to_string()),
                n.message,
                n.kind.as_str(),
                n.is_read,
                ts(&n.sent_at),
            ],
        )?;
        Ok(())
    }

    /// Notifications addressed to `user`, newest first.
    pub fn list_notifications(&self, user: UserId) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ?1
             ORDER BY sent_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user.to_string()], row_to_notification)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Mark one of `user`'s notifications read and return it.
    pub fn mark_notification_read(&self, id: Uuid, user: UserId) -> Result<Notification> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.conn()
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                params![id.to_string()],
                row_to_notification,
            )
            .map_err(not_found)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let task_str: Option<String> = row.get(2)?;
    let kind_str: String = row.get(4)?;
    let sent_str: String = row.get(6)?;

    Ok(Notification {
        id: parse_uuid(0, &id_str)?,
        user_id: UserId(parse_uuid(1, &user_str)?),
        task_id: task_str
            .map(|s| parse_uuid(2, &s).map(TaskId))
            .transpose()?,
        message: row.get(3)?,
        kind: parse_enum(4, &kind_str)?,
        is_read: row.get(5)?,
        sent_at: parse_ts(6, &sent_str)?,
    })
}
