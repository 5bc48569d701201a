use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::Database;
use crate::models::{ReviewRow, RsvpRow};
use crate::queries::{OptionalExt, map_user_summary};

/// Outcome of a review insert.
pub enum ReviewInsert {
    Created(ReviewRow),
    /// The user already reviewed this event; nothing was written.
    AlreadyReviewed,
}

impl Database {
    // -- RSVPs --

    /// Upsert keyed by (event, user). Returns the stored RSVP and whether it
    /// was newly created (`false` means an existing RSVP's status changed).
    pub fn upsert_rsvp(
        &self,
        id: &str,
        event_id: &str,
        user_id: &str,
        status: &str,
        now: &str,
    ) -> Result<(RsvpRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM rsvps WHERE event_id = ?1 AND user_id = ?2",
                    [event_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let (rsvp_id, created) = match existing {
                Some(existing_id) => {
                    tx.execute(
                        "UPDATE rsvps SET status = ?2, updated_at = ?3 WHERE id = ?1",
                        [existing_id.as_str(), status, now],
                    )?;
                    (existing_id, false)
                }
                None => {
                    tx.execute(
                        "INSERT INTO rsvps (id, event_id, user_id, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        [id, event_id, user_id, status, now],
                    )?;
                    (id.to_string(), true)
                }
            };

            let row = query_rsvp(&tx, &rsvp_id)?
                .ok_or_else(|| anyhow::anyhow!("RSVP {} vanished after write", rsvp_id))?;
            tx.commit()?;
            Ok((row, created))
        })
    }

    /// Changes the status of the user's existing RSVP. `status: None` leaves it
    /// as is. Returns `None` when the user has not RSVPed to the event.
    pub fn update_rsvp_status(
        &self,
        event_id: &str,
        user_id: &str,
        status: Option<&str>,
        now: &str,
    ) -> Result<Option<RsvpRow>> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM rsvps WHERE event_id = ?1 AND user_id = ?2",
                    [event_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(rsvp_id) = existing else {
                return Ok(None);
            };

            if let Some(status) = status {
                conn.execute(
                    "UPDATE rsvps SET status = ?2, updated_at = ?3 WHERE id = ?1",
                    [rsvp_id.as_str(), status, now],
                )?;
            }

            query_rsvp(conn, &rsvp_id)
        })
    }

    #[cfg(test)]
    pub fn get_rsvp(&self, id: &str) -> Result<Option<RsvpRow>> {
        self.with_conn(|conn| query_rsvp(conn, id))
    }

    // -- Reviews --

    /// Inserts a review unless the user already reviewed the event.
    pub fn insert_review(
        &self,
        id: &str,
        event_id: &str,
        user_id: &str,
        rating: i64,
        comment: &str,
        now: &str,
    ) -> Result<ReviewInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let reviewed: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM reviews WHERE event_id = ?1 AND user_id = ?2)",
                [event_id, user_id],
                |row| row.get(0),
            )?;
            if reviewed {
                return Ok(ReviewInsert::AlreadyReviewed);
            }

            tx.execute(
                "INSERT INTO reviews (id, event_id, user_id, rating, comment, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, event_id, user_id, rating, comment, now],
            )?;

            let row = tx
                .query_row(&format!("{REVIEW_SELECT} WHERE v.id = ?1"), [id], map_review)
                .optional()?
                .ok_or_else(|| anyhow::anyhow!("Review {} vanished after write", id))?;
            tx.commit()?;
            Ok(ReviewInsert::Created(row))
        })
    }

    /// Reviews of one event, newest first, with the total count.
    pub fn list_reviews(&self, event_id: &str, limit: u32, offset: u64) -> Result<(u64, Vec<ReviewRow>)> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reviews WHERE event_id = ?1",
                [event_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "{REVIEW_SELECT} WHERE v.event_id = ?1 ORDER BY v.created_at DESC, v.id LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![event_id, limit, offset as i64], map_review)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((count as u64, rows))
        })
    }
}

const RSVP_SELECT: &str = "SELECT r.id, r.event_id, e.title, r.user_id, u.username, p.full_name,
        r.status, r.created_at, r.updated_at
     FROM rsvps r
     JOIN events e ON e.id = r.event_id
     JOIN users u ON u.id = r.user_id
     LEFT JOIN profiles p ON p.user_id = r.user_id";

const REVIEW_SELECT: &str = "SELECT v.id, v.event_id, e.title, v.user_id, u.username, p.full_name,
        v.rating, v.comment, v.created_at, v.updated_at
     FROM reviews v
     JOIN events e ON e.id = v.event_id
     JOIN users u ON u.id = v.user_id
     LEFT JOIN profiles p ON p.user_id = v.user_id";

fn query_rsvp(conn: &Connection, id: &str) -> Result<Option<RsvpRow>> {
    conn.query_row(&format!("{RSVP_SELECT} WHERE r.id = ?1"), [id], map_rsvp)
        .optional()
}

fn map_rsvp(row: &Row<'_>) -> rusqlite::Result<RsvpRow> {
    Ok(RsvpRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        event_title: row.get(2)?,
        user: map_user_summary(row, 3)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_review(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        event_title: row.get(2)?,
        user: map_user_summary(row, 3)?,
        rating: row.get(6)?,
        comment: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_support::{seed_event, seed_user};
    use crate::timestamp;

    fn now() -> String {
        timestamp(Utc::now())
    }

    #[test]
    fn rsvp_upsert_creates_then_updates() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);

        let (first, created) = db.upsert_rsvp("r1", &event, &bob, "Going", &now()).unwrap();
        assert!(created);
        assert_eq!(first.status, "Going");
        assert_eq!(first.event_title, "Party");

        let (second, created) = db.upsert_rsvp("r2", &event, &bob, "Maybe", &now()).unwrap();
        assert!(!created);
        assert_eq!(second.id, "r1");
        assert_eq!(second.status, "Maybe");
        assert!(db.get_rsvp("r2").unwrap().is_none());
    }

    #[test]
    fn rsvp_count_tracks_going_only() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);
        for (name, status) in [("bob", "Going"), ("carol", "Maybe"), ("dave", "Going"), ("erin", "Not Going")] {
            let user = seed_user(&db, name);
            db.upsert_rsvp(&format!("rsvp-{name}"), &event, &user, status, &now()).unwrap();
        }

        assert_eq!(db.get_event(&event).unwrap().unwrap().rsvp_count, 2);
    }

    #[test]
    fn update_requires_existing_rsvp() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);

        assert!(db.update_rsvp_status(&event, &bob, Some("Maybe"), &now()).unwrap().is_none());

        db.upsert_rsvp("r1", &event, &bob, "Going", &now()).unwrap();
        let unchanged = db.update_rsvp_status(&event, &bob, None, &now()).unwrap().unwrap();
        assert_eq!(unchanged.status, "Going");
        let changed = db.update_rsvp_status(&event, &bob, Some("Not Going"), &now()).unwrap().unwrap();
        assert_eq!(changed.status, "Not Going");
    }

    #[test]
    fn second_review_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);

        assert!(matches!(
            db.insert_review("v1", &event, &bob, 4, "Nice", &now()).unwrap(),
            ReviewInsert::Created(_)
        ));
        assert!(matches!(
            db.insert_review("v2", &event, &bob, 5, "Again", &now()).unwrap(),
            ReviewInsert::AlreadyReviewed
        ));
        assert_eq!(db.list_reviews(&event, 10, 0).unwrap().0, 1);
    }

    #[test]
    fn average_rating_is_unset_without_reviews() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);
        assert_eq!(db.get_event(&event).unwrap().unwrap().average_rating, None);

        for (name, rating) in [("bob", 4), ("carol", 5), ("dave", 2)] {
            let user = seed_user(&db, name);
            db.insert_review(&format!("v-{name}"), &event, &user, rating, "ok", &now()).unwrap();
        }
        let mean = db.get_event(&event).unwrap().unwrap().average_rating.unwrap();
        assert!((mean - 11.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn deleting_event_cascades() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);
        db.upsert_rsvp("r1", &event, &bob, "Going", &now()).unwrap();
        db.insert_review("v1", &event, &bob, 3, "Fine", &now()).unwrap();

        assert!(db.delete_event(&event).unwrap());
        assert!(db.get_rsvp("r1").unwrap().is_none());
        let reviews: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM reviews", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(reviews, 0);
        assert!(!db.delete_event(&event).unwrap());
    }
}
