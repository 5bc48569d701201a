use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};

use crate::Database;
use crate::models::{EventRow, UserSummaryRow};
use crate::queries::{OptionalExt, map_user_summary};

/// Writable columns of an event, already validated by the caller.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOrdering {
    StartTime,
    #[default]
    StartTimeDesc,
    CreatedAt,
    CreatedAtDesc,
}

impl EventOrdering {
    /// Parses the `ordering` query value; a leading `-` means descending.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "start_time" => Some(Self::StartTime),
            "-start_time" => Some(Self::StartTimeDesc),
            "created_at" => Some(Self::CreatedAt),
            "-created_at" => Some(Self::CreatedAtDesc),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::StartTime => "e.start_time ASC, e.id",
            Self::StartTimeDesc => "e.start_time DESC, e.id",
            Self::CreatedAt => "e.created_at ASC, e.id",
            Self::CreatedAtDesc => "e.created_at DESC, e.id",
        }
    }
}

/// Listing criteria. `viewer` applies the visibility rule: `None` sees public
/// events only, a user also sees private events they organize or are invited to.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub viewer: Option<String>,
    pub location: Option<String>,
    pub is_public: Option<bool>,
    pub organizer_username: Option<String>,
    pub search: Option<String>,
    pub ordering: EventOrdering,
    pub limit: u32,
    pub offset: u64,
}

impl Database {
    pub fn insert_event(
        &self,
        id: &str,
        organizer_id: &str,
        fields: &EventFields,
        invited_user_ids: &[String],
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO events (id, title, description, organizer_id, location, start_time, end_time,
                                     is_public, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                rusqlite::params![
                    id,
                    fields.title,
                    fields.description,
                    organizer_id,
                    fields.location,
                    fields.start_time,
                    fields.end_time,
                    fields.is_public,
                    now,
                ],
            )?;
            replace_invites(&tx, id, invited_user_ids)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Overwrites the writable columns. `invited_user_ids: None` keeps the
    /// current invitations, `Some` replaces them. Moving the start time
    /// re-arms reminders for the event's attendees.
    pub fn update_event(
        &self,
        id: &str,
        fields: &EventFields,
        invited_user_ids: Option<&[String]>,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous_start: Option<String> = tx
                .query_row("SELECT start_time FROM events WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            tx.execute(
                "UPDATE events
                 SET title = ?2, description = ?3, location = ?4, start_time = ?5, end_time = ?6,
                     is_public = ?7, updated_at = ?8
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    fields.title,
                    fields.description,
                    fields.location,
                    fields.start_time,
                    fields.end_time,
                    fields.is_public,
                    now,
                ],
            )?;
            if previous_start.as_deref() != Some(fields.start_time.as_str()) {
                tx.execute("UPDATE rsvps SET reminded_at = NULL WHERE event_id = ?1", [id])?;
            }
            if let Some(ids) = invited_user_ids {
                replace_invites(&tx, id, ids)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Deletes the event; RSVPs, reviews and invitations go with it.
    /// Returns whether a row was removed.
    pub fn delete_event(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM events WHERE id = ?1", [id])? > 0))
    }

    pub fn get_event(&self, id: &str) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{EVENT_SELECT} WHERE e.id = ?1"), [id], map_event)
                .optional()
        })
    }

    pub fn is_invited(&self, event_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let invited = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM event_invites WHERE event_id = ?1 AND user_id = ?2)",
                [event_id, user_id],
                |row| row.get(0),
            )?;
            Ok(invited)
        })
    }

    pub fn get_invited_users(&self, event_id: &str) -> Result<Vec<UserSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, p.full_name
                 FROM event_invites i
                 JOIN users u ON u.id = i.user_id
                 LEFT JOIN profiles p ON p.user_id = u.id
                 WHERE i.event_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([event_id], |row| map_user_summary(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the total number of matching events and the requested page.
    pub fn list_events(&self, filter: &EventFilter) -> Result<(u64, Vec<EventRow>)> {
        self.with_conn(|conn| query_events(conn, filter))
    }
}

const EVENT_SELECT: &str = "SELECT e.id, e.title, e.description,
        e.organizer_id, u.username, p.full_name,
        e.location, e.start_time, e.end_time, e.is_public, e.created_at, e.updated_at,
        (SELECT COUNT(*) FROM rsvps r WHERE r.event_id = e.id AND r.status = 'Going'),
        (SELECT AVG(v.rating) FROM reviews v WHERE v.event_id = e.id)
     FROM events e
     JOIN users u ON u.id = e.organizer_id
     LEFT JOIN profiles p ON p.user_id = e.organizer_id";

fn map_event(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        organizer: map_user_summary(row, 3)?,
        location: row.get(6)?,
        start_time: row.get(7)?,
        end_time: row.get(8)?,
        is_public: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        rsvp_count: row.get(12)?,
        average_rating: row.get(13)?,
    })
}

fn replace_invites(conn: &Connection, event_id: &str, user_ids: &[String]) -> Result<()> {
    conn.execute("DELETE FROM event_invites WHERE event_id = ?1", [event_id])?;
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO event_invites (event_id, user_id) VALUES (?1, ?2)")?;
    for user_id in user_ids {
        stmt.execute([event_id, user_id.as_str()])?;
    }
    Ok(())
}

fn query_events(conn: &Connection, filter: &EventFilter) -> Result<(u64, Vec<EventRow>)> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    match &filter.viewer {
        None => clauses.push("e.is_public = 1".to_string()),
        Some(viewer) => {
            params.push(Box::new(viewer.clone()));
            let n = params.len();
            clauses.push(format!(
                "(e.is_public = 1 OR e.organizer_id = ?{n}
                  OR EXISTS (SELECT 1 FROM event_invites i WHERE i.event_id = e.id AND i.user_id = ?{n}))"
            ));
        }
    }

    if let Some(location) = &filter.location {
        params.push(Box::new(location.clone()));
        clauses.push(format!("e.location = ?{}", params.len()));
    }

    if let Some(is_public) = filter.is_public {
        params.push(Box::new(is_public));
        clauses.push(format!("e.is_public = ?{}", params.len()));
    }

    if let Some(username) = &filter.organizer_username {
        params.push(Box::new(username.clone()));
        clauses.push(format!("u.username = ?{}", params.len()));
    }

    if let Some(term) = filter.search.as_deref().filter(|t| !t.is_empty()) {
        params.push(Box::new(like_pattern(term)));
        let n = params.len();
        clauses.push(format!(
            "(e.title LIKE ?{n} ESCAPE '\\' OR e.description LIKE ?{n} ESCAPE '\\' OR e.location LIKE ?{n} ESCAPE '\\')"
        ));
    }

    let where_sql = format!("WHERE {}", clauses.join(" AND "));

    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM events e JOIN users u ON u.id = e.organizer_id {where_sql}"
        ),
        rusqlite::params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    params.push(Box::new(filter.limit));
    let limit_n = params.len();
    params.push(Box::new(filter.offset as i64));
    let offset_n = params.len();

    let sql = format!(
        "{EVENT_SELECT} {where_sql} ORDER BY {} LIMIT ?{limit_n} OFFSET ?{offset_n}",
        filter.ordering.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), map_event)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((count as u64, rows))
}

/// `%term%` with LIKE wildcards in the term escaped. SQLite LIKE folds case
/// for ASCII letters only.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::test_support::{seed_event, seed_user};
    use crate::timestamp;

    fn filter(viewer: Option<&str>) -> EventFilter {
        EventFilter {
            viewer: viewer.map(str::to_string),
            limit: 50,
            ..Default::default()
        }
    }

    fn titles(rows: &[EventRow]) -> Vec<&str> {
        rows.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn anonymous_listing_shows_only_public_events() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let soon = Utc::now() + Duration::days(1);
        seed_event(&db, &alice, "Open day", soon, true);
        seed_event(&db, &alice, "Board meeting", soon, false);

        let (count, rows) = db.list_events(&filter(None)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(titles(&rows), vec!["Open day"]);
    }

    #[test]
    fn private_events_visible_to_organizer_and_invitees_only() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let event = seed_event(&db, &alice, "Board meeting", Utc::now() + Duration::days(1), false);

        let row = db.get_event(&event).unwrap().unwrap();
        let fields = EventFields {
            title: row.title,
            description: row.description,
            location: row.location,
            start_time: row.start_time,
            end_time: row.end_time,
            is_public: row.is_public,
        };
        db.update_event(&event, &fields, Some(std::slice::from_ref(&bob)), &timestamp(Utc::now()))
            .unwrap();

        assert_eq!(db.list_events(&filter(Some(&alice))).unwrap().0, 1);
        assert_eq!(db.list_events(&filter(Some(&bob))).unwrap().0, 1);
        assert_eq!(db.list_events(&filter(Some(&carol))).unwrap().0, 0);
        assert!(db.is_invited(&event, &bob).unwrap());
        assert_eq!(db.get_invited_users(&event).unwrap()[0].username, "bob");
    }

    #[test]
    fn search_and_ordering() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let now = Utc::now();
        seed_event(&db, &alice, "Rust meetup", now + Duration::days(3), true);
        seed_event(&db, &alice, "Go meetup", now + Duration::days(1), true);
        seed_event(&db, &alice, "Picnic", now + Duration::days(2), true);

        let mut f = filter(None);
        f.search = Some("MEETUP".to_string());
        f.ordering = EventOrdering::StartTime;
        let (count, rows) = db.list_events(&f).unwrap();
        assert_eq!(count, 2);
        assert_eq!(titles(&rows), vec!["Go meetup", "Rust meetup"]);

        let (_, rows) = db.list_events(&filter(None)).unwrap();
        assert_eq!(titles(&rows), vec!["Rust meetup", "Picnic", "Go meetup"]);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn pagination_reports_full_count() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        for day in 1..=5 {
            seed_event(&db, &alice, &format!("Event {day}"), Utc::now() + Duration::days(day), true);
        }

        let mut f = filter(None);
        f.limit = 2;
        f.offset = 4;
        let (count, rows) = db.list_events(&f).unwrap();
        assert_eq!(count, 5);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn filters_by_organizer_username() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let soon = Utc::now() + Duration::days(1);
        seed_event(&db, &alice, "Alice's", soon, true);
        seed_event(&db, &bob, "Bob's", soon, true);

        let mut f = filter(None);
        f.organizer_username = Some("bob".to_string());
        let (_, rows) = db.list_events(&f).unwrap();
        assert_eq!(titles(&rows), vec!["Bob's"]);
    }

    #[test]
    fn is_public_filter_stays_within_visibility() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let soon = Utc::now() + Duration::days(1);
        seed_event(&db, &alice, "Open day", soon, true);
        seed_event(&db, &alice, "Board meeting", soon, false);

        let mut private = filter(None);
        private.is_public = Some(false);
        assert_eq!(db.list_events(&private).unwrap().0, 0);

        private.viewer = Some(bob.clone());
        assert_eq!(db.list_events(&private).unwrap().0, 0);

        private.viewer = Some(alice.clone());
        let (_, rows) = db.list_events(&private).unwrap();
        assert_eq!(titles(&rows), vec!["Board meeting"]);

        let mut public = filter(Some(&alice));
        public.is_public = Some(true);
        let (_, rows) = db.list_events(&public).unwrap();
        assert_eq!(titles(&rows), vec!["Open day"]);
    }

    #[test]
    fn end_before_start_is_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let start = Utc::now() + Duration::days(1);
        let result = db.insert_event(
            "bad",
            &alice,
            &EventFields {
                title: "Backwards".to_string(),
                description: String::new(),
                location: String::new(),
                start_time: timestamp(start),
                end_time: timestamp(start),
                is_public: true,
            },
            &[],
            &timestamp(Utc::now()),
        );
        assert!(result.is_err());
    }
}
