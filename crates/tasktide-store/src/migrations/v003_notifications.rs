use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id       TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_id  TEXT NOT NULL,               -- FK -> users(id)
    task_id  TEXT,                        -- optional task reference
    message  TEXT NOT NULL,
    kind     TEXT NOT NULL DEFAULT 'reminder',
    is_read  INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    sent_at  TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_sent
    ON notifications(user_id, sent_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
