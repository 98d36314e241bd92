use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use tasktide_shared::UserId;

use crate::convert::{parse_uuid, ts};
use crate::database::Database;
use crate::error::Result;
use crate::models::Session;

impl Database {
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token_hash,
                session.user_id.to_string(),
                ts(&session.created_at),
                ts(&session.expires_at),
            ],
        )?;
        Ok(())
    }

    /// Resolve a token digest to its user, ignoring expired sessions.
    pub fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<UserId>> {
        let user = self
            .conn()
            .query_row(
                "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
                params![token_hash, ts(&now)],
                |row| {
                    let id_str: String = row.get(0)?;
                    parse_uuid(0, &id_str).map(UserId)
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(affected > 0)
    }

    /// Remove every session that expired before `now`. Returns how many.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![ts(&now)])?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_db;
    use crate::users::tests::sample_user;
    use chrono::Duration;

    #[test]
    fn expired_sessions_do_not_resolve() {
        let (db, _dir) = temp_db();
        let user = sample_user("s@example.com", "S");
        db.create_user(&user).unwrap();

        let now = Utc::now();
        let live = Session {
            token_hash: "live".into(),
            user_id: user.id,
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        let stale = Session {
            token_hash: "stale".into(),
            expires_at: now - Duration::seconds(1),
            ..live.clone()
        };
        db.create_session(&live).unwrap();
        db.create_session(&stale).unwrap();

        assert_eq!(db.session_user("live", now).unwrap(), Some(user.id));
        assert_eq!(db.session_user("stale", now).unwrap(), None);

        assert_eq!(db.purge_expired_sessions(now).unwrap(), 1);
        assert!(db.delete_session("live").unwrap());
        assert_eq!(db.session_user("live", now).unwrap(), None);
    }
}
