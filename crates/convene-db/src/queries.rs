use crate::models::{ProfileRow, UserRow, UserSummaryRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

/// Fields for a new account and its profile, written together.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub profile_id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub bio: &'a str,
    pub location: &'a str,
}

impl Database {
    // -- Users --

    /// Creates the user and their profile in one transaction.
    /// Returns `false` without writing if the username is taken.
    pub fn create_user_with_profile(&self, user: &NewUser<'_>, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                [user.username],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (user.id, user.username, user.email, user.password_hash, now),
            )?;
            tx.execute(
                "INSERT INTO profiles (id, user_id, full_name, bio, location, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![user.profile_id, user.id, user.full_name, user.bio, user.location, now],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    #[cfg(test)]
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Returns the ids from `ids` that name no user.
    pub fn missing_user_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)")?;
            let mut missing = Vec::new();
            for id in ids {
                let exists: bool = stmt.query_row([id], |row| row.get(0))?;
                if !exists {
                    missing.push(id.clone());
                }
            }
            Ok(missing)
        })
    }

    // -- Profiles --

    pub fn list_profiles(&self, limit: u32, offset: u64) -> Result<(u64, Vec<ProfileRow>)> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(&format!(
                "{PROFILE_SELECT} ORDER BY p.created_at, p.id LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset as i64], map_profile)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((count as u64, rows))
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{PROFILE_SELECT} WHERE p.id = ?1"), [id], map_profile)
                .optional()
        })
    }
}

const PROFILE_SELECT: &str = "SELECT p.id, p.user_id, u.username, u.email, p.full_name, p.bio,
        p.location, p.picture, p.created_at
     FROM profiles p
     JOIN users u ON u.id = p.user_id";

fn map_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        full_name: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        picture: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Reads a user reference from three consecutive columns: id, username, full name.
pub(crate) fn map_user_summary(row: &Row<'_>, first: usize) -> rusqlite::Result<UserSummaryRow> {
    Ok(UserSummaryRow {
        id: row.get(first)?,
        username: row.get(first + 1)?,
        full_name: row.get::<_, Option<String>>(first + 2)?.unwrap_or_default(),
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn
        .prepare("SELECT id, username, password FROM users WHERE username = ?1")?;

    stmt.query_row([username], map_user).optional()
}

#[cfg(test)]
fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, password FROM users WHERE id = ?1")?;

    stmt.query_row([id], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
