//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the convene-types API models so the store stays independent.
//! Ids and timestamps stay as stored text; the API layer parses them.

/// What login needs from an account.
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
}

/// A user reference with the display name from their profile.
#[derive(Debug, Clone)]
pub struct UserSummaryRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

pub struct ProfileRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub bio: String,
    pub location: String,
    pub picture: Option<String>,
    pub created_at: String,
}

/// An event joined with its organizer and the derived attendance figures.
pub struct EventRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub organizer: UserSummaryRow,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Count of `Going` RSVPs.
    pub rsvp_count: i64,
    /// Unrounded mean rating, `None` without reviews.
    pub average_rating: Option<f64>,
}

pub struct RsvpRow {
    pub id: String,
    pub event_id: String,
    pub event_title: String,
    pub user: UserSummaryRow,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ReviewRow {
    pub id: String,
    pub event_id: String,
    pub event_title: String,
    pub user: UserSummaryRow,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Everything an RSVP confirmation email needs.
pub struct RsvpNoticeRow {
    pub username: String,
    pub email: String,
    pub status: String,
    pub event_title: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
}

/// Everything a review notification to the organizer needs.
pub struct ReviewNoticeRow {
    pub organizer_username: String,
    pub organizer_email: String,
    pub reviewer_username: String,
    pub event_title: String,
    pub rating: i64,
    pub comment: String,
}

/// One `Going` attendee of an upcoming event who has not been reminded yet.
pub struct ReminderRow {
    pub rsvp_id: String,
    pub event_id: String,
    pub event_title: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub username: String,
    pub email: String,
}
