//! CRUD operations for [`User`] records.

use rusqlite::{params, ErrorCode};

use tasktide_shared::gamification::StreakChange;
use tasktide_shared::{ThemePreference, UserId};

use crate::convert::{like_pattern, parse_enum, parse_ts, parse_uuid, ts};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{User, UserSummary};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, points, streak, theme_preference, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. Fails with [`StoreError::Duplicate`] when the
    /// email is already registered.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, email, password_hash, name, points, streak, theme_preference, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.email,
                    user.password_hash,
                    user.name,
                    user.points,
                    user.streak,
                    user.theme_preference.as_str(),
                    ts(&user.created_at),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    StoreError::Duplicate("email")
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Case-insensitive match on name or email, excluding `exclude`.
    pub fn search_users(&self, query: &str, exclude: UserId, limit: usize) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, email FROM users
             WHERE id != ?1
               AND (name LIKE ?2 ESCAPE '\\' OR email LIKE ?2 ESCAPE '\\')
             ORDER BY name ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![exclude.to_string(), like_pattern(query), limit as i64],
            |row| {
                let id_str: String = row.get(0)?;
                Ok(UserSummary {
                    id: UserId(parse_uuid(0, &id_str)?),
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_profile(
        &self,
        id: UserId,
        name: Option<&str>,
        theme: Option<ThemePreference>,
    ) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users
             SET name = COALESCE(?2, name),
                 theme_preference = COALESCE(?3, theme_preference)
             WHERE id = ?1",
            params![id.to_string(), name, theme.map(|t| t.as_str())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    pub fn update_password_hash(&self, id: UserId, password_hash: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id.to_string(), password_hash],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Apply a completion award to the stored balance. Points never drop
    /// below zero.
    pub fn apply_award(&self, id: UserId, points_delta: i64, streak: StreakChange) -> Result<()> {
        let streak_sql = match streak {
            StreakChange::Unchanged => "streak",
            StreakChange::Increment => "streak + 1",
            StreakChange::Reset => "1",
        };
        let affected = self.conn().execute(
            &format!("UPDATE users SET points = MAX(0, points + ?2), streak = {streak_sql} WHERE id = ?1"),
            params![id.to_string(), points_delta],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let theme_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    Ok(User {
        id: UserId(parse_uuid(0, &id_str)?),
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        points: row.get(4)?,
        streak: row.get(5)?,
        theme_preference: parse_enum(6, &theme_str)?,
        created_at: parse_ts(7, &created_str)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::test_support::temp_db;
    use chrono::Utc;

    pub(crate) fn sample_user(email: &str, name: &str) -> User {
        User {
            id: UserId::new(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            name: name.to_string(),
            points: 0,
            streak: 0,
            theme_preference: ThemePreference::Auto,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_fetch() {
        let (db, _dir) = temp_db();
        let user = sample_user("ada@example.com", "Ada");
        db.create_user(&user).unwrap();

        assert_eq!(db.get_user(user.id).unwrap(), user);
        assert_eq!(db.get_user_by_email("ada@example.com").unwrap().id, user.id);
        assert!(matches!(db.get_user(UserId::new()), Err(StoreError::NotFound)));
    }

    #[test]
    fn duplicate_email_rejected() {
        let (db, _dir) = temp_db();
        db.create_user(&sample_user("dup@example.com", "A")).unwrap();
        let err = db.create_user(&sample_user("dup@example.com", "B")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
    }

    #[test]
    fn award_clamps_points_and_moves_streak() {
        let (db, _dir) = temp_db();
        let user = sample_user("p@example.com", "P");
        db.create_user(&user).unwrap();

        db.apply_award(user.id, 15, StreakChange::Reset).unwrap();
        db.apply_award(user.id, 10, StreakChange::Increment).unwrap();
        let u = db.get_user(user.id).unwrap();
        assert_eq!((u.points, u.streak), (25, 2));

        db.apply_award(user.id, -40, StreakChange::Unchanged).unwrap();
        let u = db.get_user(user.id).unwrap();
        assert_eq!((u.points, u.streak), (0, 2));
    }

    #[test]
    fn search_matches_name_or_email_and_skips_caller() {
        let (db, _dir) = temp_db();
        let me = sample_user("me@example.com", "Grace");
        let other = sample_user("grace.h@example.com", "Hopper");
        let third = sample_user("linus@example.com", "Linus");
        for u in [&me, &other, &third] {
            db.create_user(u).unwrap();
        }

        let found = db.search_users("GRACE", me.id, 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, other.id);
    }

    #[test]
    fn profile_update_is_partial() {
        let (db, _dir) = temp_db();
        let user = sample_user("t@example.com", "Tess");
        db.create_user(&user).unwrap();

        let updated = db
            .update_profile(user.id, None, Some(ThemePreference::Dark))
            .unwrap();
        assert_eq!(updated.name, "Tess");
        assert_eq!(updated.theme_preference, ThemePreference::Dark);
    }
}
