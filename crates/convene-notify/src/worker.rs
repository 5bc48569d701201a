use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use convene_db::Database;
use convene_types::jobs::EmailJob;

use crate::mailer::{Mailer, OutgoingEmail};
use crate::messages;

/// Handle request handlers use to queue email jobs. Enqueueing never blocks
/// and never fails the caller.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<EmailJob>,
}

impl Notifier {
    /// Creates the queue. The receiver goes to [`run_worker`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmailJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: EmailJob) {
        if let Err(e) = self.tx.send(job) {
            warn!("Email worker is gone, dropping {:?}", e.0);
        }
    }
}

/// Drains the queue until every [`Notifier`] is dropped. Failures are logged
/// and the job discarded.
pub async fn run_worker<M: Mailer>(
    db: Arc<Database>,
    mailer: Arc<M>,
    mut jobs: mpsc::UnboundedReceiver<EmailJob>,
) {
    while let Some(job) = jobs.recv().await {
        match deliver(&db, mailer.as_ref(), &job).await {
            Ok(true) => debug!("Delivered {:?}", job),
            Ok(false) => warn!("Skipping {:?}: record no longer exists", job),
            Err(e) => warn!("Email job {:?} failed: {}", job, e),
        }
    }

    info!("Email worker stopped");
}

/// Loads what `job` refers to and sends the email. Returns `Ok(false)` when the
/// referenced record is gone.
pub async fn deliver<M: Mailer>(db: &Arc<Database>, mailer: &M, job: &EmailJob) -> anyhow::Result<bool> {
    let db = db.clone();
    let job_owned = job.clone();
    let email: Option<OutgoingEmail> = tokio::task::spawn_blocking(move || {
        let email = match job_owned {
            EmailJob::RsvpConfirmation { rsvp_id } => db
                .get_rsvp_notice(&rsvp_id.to_string())?
                .map(|notice| messages::rsvp_confirmation(&notice)),
            EmailJob::ReviewNotification { review_id } => db
                .get_review_notice(&review_id.to_string())?
                .map(|notice| messages::review_notification(&notice)),
        };
        Ok::<_, anyhow::Error>(email)
    })
    .await??;

    let Some(email) = email else {
        return Ok(false);
    };

    mailer.send(&email).await?;
    info!("Sent \"{}\" to {}", email.subject, email.to);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::test_support::{RecordingMailer, seed_event_with_rsvp};

    #[tokio::test]
    async fn rsvp_job_mails_the_attendee() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let rsvp_id = seed_event_with_rsvp(&db, "Party", Utc::now() + Duration::days(2), "Going");
        let mailer = RecordingMailer::default();

        let sent = deliver(&db, &mailer, &EmailJob::RsvpConfirmation { rsvp_id })
            .await
            .unwrap();

        assert!(sent);
        let outbox = mailer.sent();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "guest@example.com");
        assert_eq!(outbox[0].subject, "RSVP Confirmation: Party");
    }

    #[tokio::test]
    async fn missing_record_is_skipped() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mailer = RecordingMailer::default();

        let sent = deliver(&db, &mailer, &EmailJob::ReviewNotification { review_id: Uuid::new_v4() })
            .await
            .unwrap();

        assert!(!sent);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn worker_drains_queue_and_stops_when_senders_drop() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let rsvp_id = seed_event_with_rsvp(&db, "Party", Utc::now() + Duration::days(2), "Maybe");
        let mailer = Arc::new(RecordingMailer::default());
        let (notifier, rx) = Notifier::new();

        notifier.enqueue(EmailJob::RsvpConfirmation { rsvp_id });
        notifier.enqueue(EmailJob::RsvpConfirmation { rsvp_id: Uuid::new_v4() });
        drop(notifier);

        run_worker(db, mailer.clone(), rx).await;
        assert_eq!(mailer.sent().len(), 1);
    }
}
