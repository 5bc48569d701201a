use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RsvpStatus;

// -- JWT Claims --

/// JWT claims issued by the token endpoint and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

/// Required fields are optional here so missing ones can be reported per field.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: RegisteredUser,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access: String,
    pub user_id: Uuid,
    pub username: String,
}

// -- Users --

/// Compact user reference embedded in events, RSVPs and reviews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub bio: String,
    pub location: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Events --

/// Body of both `POST /api/events/` and `PATCH /api/events/{id}/`.
/// Creation requires the schedule and text fields; a patch may carry any subset.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EventPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_public: Option<bool>,
    pub invited_user_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub organizer: UserSummary,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub rsvp_count: u64,
    pub average_rating: Option<f64>,
    /// Only present on the detail representation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_users: Option<Vec<UserSummary>>,
}

// -- RSVPs --

/// Status arrives as a plain string so unknown values get a descriptive 400.
#[derive(Debug, Default, Deserialize)]
pub struct RsvpRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RsvpResponse {
    pub id: Uuid,
    pub event: Uuid,
    pub event_title: String,
    pub user: UserSummary,
    pub status: RsvpStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Reviews --

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub event: Uuid,
    pub event_title: String,
    pub user: UserSummary,
    pub rating: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Pagination --

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}
