//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `users`, `sessions` and `tasks`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    email            TEXT NOT NULL UNIQUE,        -- lowercased, trimmed
    password_hash    TEXT NOT NULL,               -- argon2 PHC string
    name             TEXT NOT NULL DEFAULT '',
    points           INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
    streak           INTEGER NOT NULL DEFAULT 0 CHECK (streak >= 0),
    theme_preference TEXT NOT NULL DEFAULT 'auto',
    created_at       TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Sessions (bearer tokens, stored as digests only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY NOT NULL,         -- hex blake3 digest
    user_id    TEXT NOT NULL,                     -- FK -> users(id)
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

-- ----------------------------------------------------------------
-- Tasks
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS tasks (
    id             TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id        TEXT NOT NULL,                 -- owner, FK -> users(id)
    title          TEXT NOT NULL,
    description    TEXT NOT NULL DEFAULT '',
    status         TEXT NOT NULL DEFAULT 'pending',
    priority       TEXT NOT NULL DEFAULT 'medium',
    tags           TEXT NOT NULL DEFAULT '[]',    -- JSON array of strings
    due_date       TEXT,
    is_recurring   INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    recurring_type TEXT,
    completed_at   TEXT,
    shared_with    TEXT NOT NULL DEFAULT '[]',    -- JSON array of user ids
    attachments    TEXT NOT NULL DEFAULT '[]',    -- JSON array of file refs
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_user_created
    ON tasks(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_tasks_user_completed
    ON tasks(user_id, completed_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
