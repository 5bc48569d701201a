use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use convene_db::timestamp;
use convene_types::api::{RsvpRequest, RsvpResponse};
use convene_types::jobs::EmailJob;
use convene_types::models::RsvpStatus;

use crate::access::can_edit_own;
use crate::auth::AppState;
use crate::convert::rsvp_response;
use crate::error::ApiError;
use crate::events::load_visible_event;
use crate::middleware::AuthUser;

/// Creates the caller's RSVP or changes its status. Answers 201 for a new RSVP
/// and 200 for an update; either way a confirmation email is queued.
pub async fn create_rsvp(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(event_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<RsvpRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_event(&state, event_id, Some(user.id())).await?;
    let status = parse_status(req.status.as_deref())?.unwrap_or_default();

    let rsvp_id = Uuid::new_v4().to_string();
    let event = event_id.to_string();
    let user_id = user.id().to_string();
    let now = timestamp(Utc::now());
    let (row, created) = state
        .run_db(move |db| db.upsert_rsvp(&rsvp_id, &event, &user_id, status.as_str(), &now))
        .await?;

    let response = rsvp_response(row);
    info!(
        "User {} RSVPed {} to event {} ({})",
        user.0.username,
        response.status,
        event_id,
        if created { "new" } else { "updated" }
    );

    state.notifier.enqueue(EmailJob::RsvpConfirmation { rsvp_id: response.id });

    let code = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((code, Json(response)))
}

/// Changes the status of an existing RSVP. Only its owner may do so; no email
/// is sent.
pub async fn update_rsvp(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path((event_id, owner_id)), _): WithRejection<Path<(Uuid, Uuid)>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<RsvpRequest>, ApiError>,
) -> Result<Json<RsvpResponse>, ApiError> {
    load_visible_event(&state, event_id, Some(user.id())).await?;
    if !can_edit_own(owner_id, user.id()) {
        return Err(ApiError::Forbidden("You can only update your own RSVP.".to_string()));
    }
    // An empty status leaves the RSVP unchanged.
    let status = parse_status(req.status.as_deref().filter(|s| !s.trim().is_empty()))?;

    let event = event_id.to_string();
    let owner = owner_id.to_string();
    let now = timestamp(Utc::now());
    let row = state
        .run_db(move |db| db.update_rsvp_status(&event, &owner, status.map(|s| s.as_str()), &now))
        .await?
        .ok_or_else(|| ApiError::NotFound("RSVP not found.".to_string()))?;

    Ok(Json(rsvp_response(row)))
}

fn parse_status(raw: Option<&str>) -> Result<Option<RsvpStatus>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.parse().map(Some).map_err(|_| {
        let choices: Vec<&str> = RsvpStatus::ALL.iter().map(RsvpStatus::as_str).collect();
        ApiError::validation(
            "status",
            format!("\"{raw}\" is not a valid choice. Choose one of: {}.", choices.join(", ")),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("Not Going")).unwrap(), Some(RsvpStatus::NotGoing));
        match parse_status(Some("Perhaps")) {
            Err(ApiError::Validation(errors)) => assert!(errors.contains("status")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
