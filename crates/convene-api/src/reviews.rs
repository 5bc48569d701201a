use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use convene_db::attendance::ReviewInsert;
use convene_db::timestamp;
use convene_types::api::{Page, ReviewRequest, ReviewResponse};
use convene_types::jobs::EmailJob;
use convene_types::models::{MAX_RATING, MIN_RATING};

use crate::auth::AppState;
use crate::convert::review_response;
use crate::error::{ApiError, FieldErrors, NON_FIELD_ERRORS};
use crate::events::load_visible_event;
use crate::middleware::AuthUser;
use crate::pagination::{PageQuery, Pagination};

/// Reviews of an event, newest first.
pub async fn list_reviews(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(event_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ApiError>,
) -> Result<Json<Page<ReviewResponse>>, ApiError> {
    let pagination = Pagination::from_query(query.page, query.page_size)?;
    load_visible_event(&state, event_id, Some(user.id())).await?;

    let event = event_id.to_string();
    let (count, rows) = state
        .run_db(move |db| db.list_reviews(&event, pagination.limit(), pagination.offset()))
        .await?;
    let results = rows.into_iter().map(review_response).collect();

    Ok(Json(pagination.wrap(count, results)))
}

/// Adds the caller's review. One review per user and event; the organizer is
/// notified by email.
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(event_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<ReviewRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_event(&state, event_id, Some(user.id())).await?;
    let (rating, comment) = validate_review(req)?;

    let review_id = Uuid::new_v4().to_string();
    let event = event_id.to_string();
    let user_id = user.id().to_string();
    let now = timestamp(Utc::now());
    let inserted = state
        .run_db(move |db| db.insert_review(&review_id, &event, &user_id, rating, &comment, &now))
        .await?;

    let row = match inserted {
        ReviewInsert::Created(row) => row,
        ReviewInsert::AlreadyReviewed => {
            return Err(ApiError::validation(NON_FIELD_ERRORS, "You have already reviewed this event"));
        }
    };

    let response = review_response(row);
    info!("User {} reviewed event {} ({} stars)", user.0.username, event_id, rating);

    state.notifier.enqueue(EmailJob::ReviewNotification { review_id: response.id });

    Ok((StatusCode::CREATED, Json(response)))
}

fn validate_review(req: ReviewRequest) -> Result<(i64, String), ApiError> {
    let mut errors = FieldErrors::new();

    let rating = errors.require("rating", req.rating);
    if let Some(rating) = rating {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            errors.add("rating", format!("Rating must be between {MIN_RATING} and {MAX_RATING}."));
        }
    }

    let comment = errors.require("comment", req.comment.map(|c| c.trim().to_string()));
    if comment.as_deref() == Some("") {
        errors.add("comment", "This field may not be blank.");
    }

    errors.into_result()?;
    match (rating, comment) {
        (Some(rating), Some(comment)) => Ok((rating, comment)),
        _ => Err(ApiError::Internal(anyhow::anyhow!("review validated without required fields"))),
    }
}
