//! Stored rows to API representations. Ids and timestamps are stored as text;
//! a value that fails to parse is logged and replaced so one corrupt row does
//! not take down a whole listing.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use convene_db::models::{EventRow, ProfileRow, ReviewRow, RsvpRow, UserSummaryRow};
use convene_db::parse_timestamp;
use convene_types::api::{EventResponse, ProfileResponse, ReviewResponse, RsvpResponse, UserSummary};
use convene_types::models::{RsvpStatus, round_rating};

pub(crate) fn parse_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|_| {
        warn!("Corrupt id in database: {}", raw);
        Uuid::nil()
    })
}

pub(crate) fn parse_time(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|_| {
        warn!("Corrupt timestamp in database: {}", raw);
        DateTime::<Utc>::default()
    })
}

pub(crate) fn user_summary(row: UserSummaryRow) -> UserSummary {
    UserSummary {
        id: parse_id(&row.id),
        username: row.username,
        full_name: row.full_name,
    }
}

/// `invited` is only given for the detail representation.
pub(crate) fn event_response(row: EventRow, invited: Option<Vec<UserSummaryRow>>) -> EventResponse {
    EventResponse {
        id: parse_id(&row.id),
        title: row.title,
        description: row.description,
        organizer: user_summary(row.organizer),
        location: row.location,
        start_time: parse_time(&row.start_time),
        end_time: parse_time(&row.end_time),
        is_public: row.is_public,
        created_at: parse_time(&row.created_at),
        updated_at: parse_time(&row.updated_at),
        rsvp_count: row.rsvp_count.max(0) as u64,
        average_rating: round_rating(row.average_rating),
        invited_users: invited.map(|users| users.into_iter().map(user_summary).collect()),
    }
}

pub(crate) fn rsvp_response(row: RsvpRow) -> RsvpResponse {
    let status = row.status.parse().unwrap_or_else(|_| {
        warn!("Corrupt RSVP status in database: {}", row.status);
        RsvpStatus::default()
    });

    RsvpResponse {
        id: parse_id(&row.id),
        event: parse_id(&row.event_id),
        event_title: row.event_title,
        user: user_summary(row.user),
        status,
        created_at: parse_time(&row.created_at),
        updated_at: parse_time(&row.updated_at),
    }
}

pub(crate) fn review_response(row: ReviewRow) -> ReviewResponse {
    ReviewResponse {
        id: parse_id(&row.id),
        event: parse_id(&row.event_id),
        event_title: row.event_title,
        user: user_summary(row.user),
        rating: row.rating,
        comment: row.comment,
        created_at: parse_time(&row.created_at),
        updated_at: parse_time(&row.updated_at),
    }
}

pub(crate) fn profile_response(row: ProfileRow) -> ProfileResponse {
    ProfileResponse {
        id: parse_id(&row.id),
        username: row.username,
        email: row.email,
        full_name: row.full_name,
        bio: row.bio,
        location: row.location,
        profile_picture: row.picture,
        created_at: parse_time(&row.created_at),
    }
}
