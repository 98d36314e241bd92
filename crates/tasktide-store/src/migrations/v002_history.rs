use rusqlite::Connection;

// No FK on task_id: entries must outlive the task so a delete can be undone.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS task_history (
    id             TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    task_id        TEXT NOT NULL,
    action         TEXT NOT NULL,               -- created/updated/deleted/completed
    previous_state TEXT,                        -- JSON object snapshot
    user_id        TEXT NOT NULL,               -- acting user
    timestamp      TEXT NOT NULL                -- RFC-3339, nanosecond precision
);

CREATE INDEX IF NOT EXISTS idx_history_task_ts
    ON task_history(task_id, timestamp DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
