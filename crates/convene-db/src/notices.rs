use anyhow::Result;

use crate::Database;
use crate::models::{ReminderRow, ReviewNoticeRow, RsvpNoticeRow};
use crate::queries::OptionalExt;

impl Database {
    pub fn get_rsvp_notice(&self, rsvp_id: &str) -> Result<Option<RsvpNoticeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT u.username, u.email, r.status, e.title, e.location, e.start_time, e.end_time
                 FROM rsvps r
                 JOIN users u ON u.id = r.user_id
                 JOIN events e ON e.id = r.event_id
                 WHERE r.id = ?1",
                [rsvp_id],
                |row| {
                    Ok(RsvpNoticeRow {
                        username: row.get(0)?,
                        email: row.get(1)?,
                        status: row.get(2)?,
                        event_title: row.get(3)?,
                        location: row.get(4)?,
                        start_time: row.get(5)?,
                        end_time: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_review_notice(&self, review_id: &str) -> Result<Option<ReviewNoticeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT o.username, o.email, u.username, e.title, v.rating, v.comment
                 FROM reviews v
                 JOIN events e ON e.id = v.event_id
                 JOIN users o ON o.id = e.organizer_id
                 JOIN users u ON u.id = v.user_id
                 WHERE v.id = ?1",
                [review_id],
                |row| {
                    Ok(ReviewNoticeRow {
                        organizer_username: row.get(0)?,
                        organizer_email: row.get(1)?,
                        reviewer_username: row.get(2)?,
                        event_title: row.get(3)?,
                        rating: row.get(4)?,
                        comment: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    /// `Going` attendees of every event with `from <= start_time <= to` that
    /// have not been reminded for the event's current start time.
    pub fn going_attendees_starting_between(&self, from: &str, to: &str) -> Result<Vec<ReminderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, e.id, e.title, e.location, e.start_time, e.end_time, u.username, u.email
                 FROM events e
                 JOIN rsvps r ON r.event_id = e.id AND r.status = 'Going' AND r.reminded_at IS NULL
                 JOIN users u ON u.id = r.user_id
                 WHERE e.start_time >= ?1 AND e.start_time <= ?2
                 ORDER BY e.start_time, e.id, u.username",
            )?;
            let rows = stmt
                .query_map([from, to], |row| {
                    Ok(ReminderRow {
                        rsvp_id: row.get(0)?,
                        event_id: row.get(1)?,
                        event_title: row.get(2)?,
                        location: row.get(3)?,
                        start_time: row.get(4)?,
                        end_time: row.get(5)?,
                        username: row.get(6)?,
                        email: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Records that these RSVPs got their reminder.
    pub fn mark_reminded(&self, rsvp_ids: &[String], now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("UPDATE rsvps SET reminded_at = ?2 WHERE id = ?1")?;
                for id in rsvp_ids {
                    stmt.execute([id.as_str(), now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::events::EventFields;
    use crate::test_support::{seed_event, seed_user};
    use crate::{Database, timestamp};

    #[test]
    fn reminder_window_selects_going_attendees_of_upcoming_events() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let soon = seed_event(&db, &alice, "Soon", now + Duration::hours(5), true);
        let later = seed_event(&db, &alice, "Later", now + Duration::days(3), true);
        let stamp = timestamp(now);
        db.upsert_rsvp("r1", &soon, &bob, "Going", &stamp).unwrap();
        db.upsert_rsvp("r2", &soon, &carol, "Maybe", &stamp).unwrap();
        db.upsert_rsvp("r3", &later, &bob, "Going", &stamp).unwrap();

        let rows = db
            .going_attendees_starting_between(&timestamp(now), &timestamp(now + Duration::hours(24)))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_title, "Soon");
        assert_eq!(rows[0].username, "bob");
        assert_eq!(rows[0].email, "bob@example.com");

        db.mark_reminded(&[rows[0].rsvp_id.clone()], &stamp).unwrap();
        let again = db
            .going_attendees_starting_between(&timestamp(now), &timestamp(now + Duration::hours(24)))
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn moving_the_start_time_rearms_reminders() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let event = seed_event(&db, &alice, "Soon", now + Duration::hours(5), true);
        let stamp = timestamp(now);
        db.upsert_rsvp("r1", &event, &bob, "Going", &stamp).unwrap();
        db.upsert_rsvp("r2", &event, &carol, "Going", &stamp).unwrap();
        let window = || {
            db.going_attendees_starting_between(&timestamp(now), &timestamp(now + Duration::hours(24)))
                .unwrap()
        };

        // Only bob's send succeeded; carol stays due.
        db.mark_reminded(&["r1".to_string()], &stamp).unwrap();
        let due: Vec<String> = window().into_iter().map(|r| r.username).collect();
        assert_eq!(due, vec!["carol"]);

        let row = db.get_event(&event).unwrap().unwrap();
        let mut fields = EventFields {
            title: "Renamed".into(),
            description: row.description,
            location: row.location,
            start_time: row.start_time,
            end_time: row.end_time,
            is_public: row.is_public,
        };
        db.update_event(&event, &fields, None, &stamp).unwrap();
        assert_eq!(window().len(), 1);

        fields.start_time = timestamp(now + Duration::hours(6));
        db.update_event(&event, &fields, None, &stamp).unwrap();
        assert_eq!(window().len(), 2);
    }

    #[test]
    fn notices_join_recipient_details() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let event = seed_event(&db, &alice, "Party", Utc::now() + Duration::days(1), true);
        let stamp = timestamp(Utc::now());
        db.upsert_rsvp("r1", &event, &bob, "Maybe", &stamp).unwrap();
        db.insert_review("v1", &event, &bob, 5, "Loved it", &stamp).unwrap();

        let rsvp = db.get_rsvp_notice("r1").unwrap().unwrap();
        assert_eq!(rsvp.email, "bob@example.com");
        assert_eq!(rsvp.status, "Maybe");

        let review = db.get_review_notice("v1").unwrap().unwrap();
        assert_eq!(review.organizer_email, "alice@example.com");
        assert_eq!(review.reviewer_username, "bob");
        assert!(db.get_review_notice("missing").unwrap().is_none());
    }
}
