use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Email work queued by request handlers and drained by the notifier worker.
///
/// Jobs carry ids only. The worker reloads the rows and drops a job whose rows
/// are gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EmailJob {
    /// Tell the attendee their RSVP was recorded.
    RsvpConfirmation { rsvp_id: Uuid },

    /// Tell the organizer someone reviewed their event.
    ReviewNotification { review_id: Uuid },
}
