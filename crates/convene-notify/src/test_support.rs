use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use convene_db::events::EventFields;
use convene_db::queries::NewUser;
use convene_db::{Database, timestamp};

use crate::mailer::{MailError, Mailer, OutgoingEmail};

/// Keeps every sent email; fails for recipients listed in `reject`.
#[derive(Default)]
pub struct RecordingMailer {
    outbox: Mutex<Vec<OutgoingEmail>>,
    pub reject: HashSet<String>,
}

impl RecordingMailer {
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            outbox: Mutex::default(),
            reject: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.reject.contains(&email.to) {
            return Err(MailError::Transport(format!("mailbox {} unavailable", email.to)));
        }
        self.outbox.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn seed_user(db: &Database, username: &str, email: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let profile_id = Uuid::new_v4().to_string();
    db.create_user_with_profile(
        &NewUser {
            id: &id,
            profile_id: &profile_id,
            username,
            email,
            password_hash: "hash",
            full_name: "",
            bio: "",
            location: "",
        },
        &timestamp(Utc::now()),
    )
    .unwrap();
    id
}

pub fn seed_event(db: &Database, organizer_id: &str, title: &str, start: DateTime<Utc>) -> String {
    let id = Uuid::new_v4().to_string();
    db.insert_event(
        &id,
        organizer_id,
        &EventFields {
            title: title.to_string(),
            description: "description".to_string(),
            location: "Main hall".to_string(),
            start_time: timestamp(start),
            end_time: timestamp(start + Duration::hours(3)),
            is_public: true,
        },
        &[],
        &timestamp(Utc::now()),
    )
    .unwrap();
    id
}

/// An organizer, one event and one guest (`guest@example.com`) with an RSVP.
/// Returns the RSVP id.
pub fn seed_event_with_rsvp(db: &Database, title: &str, start: DateTime<Utc>, status: &str) -> Uuid {
    let organizer = seed_user(db, "organizer", "organizer@example.com");
    let guest = seed_user(db, "guest", "guest@example.com");
    let event = seed_event(db, &organizer, title, start);
    let rsvp_id = Uuid::new_v4();
    db.upsert_rsvp(&rsvp_id.to_string(), &event, &guest, status, &timestamp(Utc::now()))
        .unwrap();
    rsvp_id
}
