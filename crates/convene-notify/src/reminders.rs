use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use convene_db::{Database, timestamp};

use crate::mailer::Mailer;
use crate::messages;

/// How far ahead the sweep looks for starting events.
pub const REMINDER_WINDOW_HOURS: i64 = 24;

/// Background task that emails reminders for upcoming events.
///
/// Runs on an interval; each tick mails every `Going` attendee of events
/// starting within the next [`REMINDER_WINDOW_HOURS`].
pub async fn run_reminder_loop<M: Mailer>(db: Arc<Database>, mailer: Arc<M>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match send_event_reminders(&db, mailer.as_ref(), Utc::now()).await {
            Ok(sent) => info!("Reminder sweep: sent {} event reminders", sent),
            Err(e) => warn!("Reminder sweep error: {}", e),
        }
    }
}

/// One sweep. Returns the number of reminders successfully sent; a failed
/// recipient is logged and skipped.
pub async fn send_event_reminders<M: Mailer>(
    db: &Arc<Database>,
    mailer: &M,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let from = timestamp(now);
    let to = timestamp(now + chrono::Duration::hours(REMINDER_WINDOW_HOURS));

    let store = db.clone();
    let attendees =
        tokio::task::spawn_blocking(move || store.going_attendees_starting_between(&from, &to)).await??;

    let mut reminded = Vec::new();
    for attendee in &attendees {
        let email = messages::event_reminder(attendee);
        match mailer.send(&email).await {
            Ok(()) => reminded.push(attendee.rsvp_id.clone()),
            Err(e) => warn!(
                "Failed to send reminder for event {} to {} ({}): {}",
                attendee.event_id, attendee.username, attendee.email, e
            ),
        }
    }

    let sent = reminded.len();
    if sent > 0 {
        let store = db.clone();
        let stamp = timestamp(now);
        tokio::task::spawn_blocking(move || store.mark_reminded(&reminded, &stamp)).await??;
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::{RecordingMailer, seed_event, seed_user};

    #[tokio::test]
    async fn sweep_counts_successes_and_continues_past_failures() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now();
        let organizer = seed_user(&db, "organizer", "organizer@example.com");
        let event = seed_event(&db, &organizer, "Standup", now + Duration::hours(3));
        let stamp = timestamp(now);
        for (name, status) in [("ann", "Going"), ("ben", "Going"), ("cat", "Going"), ("dan", "Maybe")] {
            let user = seed_user(&db, name, &format!("{name}@example.com"));
            db.upsert_rsvp(&format!("rsvp-{name}"), &event, &user, status, &stamp)
                .unwrap();
        }
        let mailer = RecordingMailer::rejecting(&["ben@example.com"]);

        let sent = send_event_reminders(&db, &mailer, now).await.unwrap();

        assert_eq!(sent, 2);
        let recipients: Vec<String> = mailer.sent().into_iter().map(|e| e.to).collect();
        assert_eq!(recipients, vec!["ann@example.com", "cat@example.com"]);
        assert!(mailer.sent()[0].subject.starts_with("Reminder: Standup"));

        // Reminded attendees are not mailed again; the failed one is retried.
        assert_eq!(send_event_reminders(&db, &mailer, now).await.unwrap(), 0);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn events_outside_the_window_are_ignored() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now();
        let organizer = seed_user(&db, "organizer", "organizer@example.com");
        let guest = seed_user(&db, "guest", "guest@example.com");
        let far = seed_event(&db, &organizer, "Next week", now + Duration::days(7));
        db.upsert_rsvp("r1", &far, &guest, "Going", &timestamp(now)).unwrap();
        let mailer = RecordingMailer::default();

        assert_eq!(send_event_reminders(&db, &mailer, now).await.unwrap(), 0);
        assert!(mailer.sent().is_empty());
    }
}
