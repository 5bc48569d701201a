use anyhow::anyhow;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use convene_db::events::{EventFields, EventFilter, EventOrdering};
use convene_db::models::EventRow;
use convene_db::timestamp;
use convene_types::api::{EventPayload, EventResponse, Page};

use crate::access::EventAccess;
use crate::auth::AppState;
use crate::convert::{event_response, parse_id, parse_time};
use crate::error::{ApiError, FieldErrors};
use crate::middleware::AuthUser;
use crate::pagination::Pagination;

pub const TITLE_MAX: usize = 200;
pub const LOCATION_MAX: usize = 300;

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub location: Option<String>,
    pub is_public: Option<bool>,
    /// Organizer username.
    pub organizer: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub async fn list_events(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<EventListQuery>, ApiError>,
) -> Result<Json<Page<EventResponse>>, ApiError> {
    let pagination = Pagination::from_query(query.page, query.page_size)?;

    let ordering = match query.ordering.as_deref().filter(|o| !o.is_empty()) {
        None => EventOrdering::default(),
        Some(raw) => EventOrdering::parse(raw).ok_or_else(|| {
            ApiError::validation(
                "ordering",
                format!(
                    "Invalid ordering \"{raw}\". Expected one of start_time, -start_time, created_at, -created_at."
                ),
            )
        })?,
    };

    let filter = EventFilter {
        viewer: viewer.map(|user| user.id().to_string()),
        location: non_empty(query.location),
        is_public: query.is_public,
        organizer_username: non_empty(query.organizer),
        search: non_empty(query.search),
        ordering,
        limit: pagination.limit(),
        offset: pagination.offset(),
    };

    let (count, rows) = state.run_db(move |db| db.list_events(&filter)).await?;
    let results = rows.into_iter().map(|row| event_response(row, None)).collect();

    Ok(Json(pagination.wrap(count, results)))
}

pub async fn create_event(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(payload), _): WithRejection<Json<EventPayload>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let draft = EventDraft::from_payload(&payload, now)?;
    let invited = resolve_invitees(&state, payload.invited_user_ids.unwrap_or_default()).await?;

    let event_id = Uuid::new_v4();
    let id = event_id.to_string();
    let organizer = user.id().to_string();
    let fields = draft.into_fields();
    let stamp = timestamp(now);
    state
        .run_db(move |db| db.insert_event(&id, &organizer, &fields, &invited, &stamp))
        .await?;

    info!("User {} created event {}", user.0.username, event_id);

    let event = fetch_detail(&state, event_id).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    WithRejection(Path(event_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<EventResponse>, ApiError> {
    let (row, _) = load_visible_event(&state, event_id, viewer.map(|u| u.id())).await?;

    let id = row.id.clone();
    let invited = state.run_db(move |db| db.get_invited_users(&id)).await?;

    Ok(Json(event_response(row, Some(invited))))
}

pub async fn update_event(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(event_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(payload), _): WithRejection<Json<EventPayload>, ApiError>,
) -> Result<Json<EventResponse>, ApiError> {
    let (row, access) = load_visible_event(&state, event_id, Some(user.id())).await?;
    if !access.can_modify(user.id()) {
        return Err(ApiError::Forbidden("Only the organizer can modify this event.".to_string()));
    }

    let now = Utc::now();
    let mut draft = EventDraft::from_row(&row);
    draft.apply(&payload);
    draft.validate(now)?;

    let invited = match payload.invited_user_ids {
        Some(ids) => Some(resolve_invitees(&state, ids).await?),
        None => None,
    };

    let id = event_id.to_string();
    let fields = draft.into_fields();
    let stamp = timestamp(now);
    state
        .run_db(move |db| db.update_event(&id, &fields, invited.as_deref(), &stamp))
        .await?;

    info!("User {} updated event {}", user.0.username, event_id);

    Ok(Json(fetch_detail(&state, event_id).await?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Path(event_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<StatusCode, ApiError> {
    let (_, access) = load_visible_event(&state, event_id, Some(user.id())).await?;
    if !access.can_modify(user.id()) {
        return Err(ApiError::Forbidden("Only the organizer can delete this event.".to_string()));
    }

    let id = event_id.to_string();
    if !state.run_db(move |db| db.delete_event(&id)).await? {
        return Err(ApiError::not_found());
    }

    info!("User {} deleted event {}", user.0.username, event_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Loads an event the caller may see. Events that exist but are hidden from
/// the caller answer 404 like missing ones.
pub(crate) async fn load_visible_event(
    state: &AppState,
    event_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<(EventRow, EventAccess), ApiError> {
    let id = event_id.to_string();
    let (row, invited) = state
        .run_db(move |db| {
            let Some(row) = db.get_event(&id)? else {
                return Ok(None);
            };
            let invited = match viewer {
                Some(user) if !row.is_public => db.is_invited(&id, &user.to_string())?,
                _ => false,
            };
            Ok(Some((row, invited)))
        })
        .await?
        .ok_or_else(ApiError::not_found)?;

    let access = EventAccess {
        is_public: row.is_public,
        organizer_id: parse_id(&row.organizer.id),
        invited,
    };
    if !access.can_view(viewer) {
        return Err(ApiError::not_found());
    }

    Ok((row, access))
}

async fn fetch_detail(state: &AppState, event_id: Uuid) -> Result<EventResponse, ApiError> {
    let id = event_id.to_string();
    let (row, invited) = state
        .run_db(move |db| {
            let Some(row) = db.get_event(&id)? else {
                return Ok(None);
            };
            let invited = db.get_invited_users(&id)?;
            Ok(Some((row, invited)))
        })
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow!("event {} vanished after write", event_id)))?;

    Ok(event_response(row, Some(invited)))
}

/// Deduplicates the requested invitees and checks that each one exists.
async fn resolve_invitees(state: &AppState, ids: Vec<Uuid>) -> Result<Vec<String>, ApiError> {
    let mut ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(ids);
    }

    let lookup = ids.clone();
    let missing = state.run_db(move |db| db.missing_user_ids(&lookup)).await?;
    if missing.is_empty() {
        return Ok(ids);
    }

    let mut errors = FieldErrors::new();
    for id in missing {
        errors.add("invited_user_ids", format!("Invalid pk \"{id}\" - object does not exist."));
    }
    Err(ApiError::Validation(errors))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// The writable state of an event while it is being created or patched.
#[derive(Debug, Clone)]
struct EventDraft {
    title: String,
    description: String,
    location: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    is_public: bool,
}

impl EventDraft {
    fn from_payload(payload: &EventPayload, now: DateTime<Utc>) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let title = errors.require("title", payload.title.as_deref());
        let description = errors.require("description", payload.description.as_deref());
        let location = errors.require("location", payload.location.as_deref());
        let start_time = errors.require("start_time", payload.start_time);
        let end_time = errors.require("end_time", payload.end_time);

        let (Some(title), Some(description), Some(location), Some(start_time), Some(end_time)) =
            (title, description, location, start_time, end_time)
        else {
            return Err(ApiError::Validation(errors));
        };

        let draft = Self {
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            location: location.trim().to_string(),
            start_time: stored_precision(start_time),
            end_time: stored_precision(end_time),
            is_public: payload.is_public.unwrap_or(true),
        };
        draft.validate(now)?;
        Ok(draft)
    }

    fn from_row(row: &EventRow) -> Self {
        Self {
            title: row.title.clone(),
            description: row.description.clone(),
            location: row.location.clone(),
            start_time: parse_time(&row.start_time),
            end_time: parse_time(&row.end_time),
            is_public: row.is_public,
        }
    }

    /// Overlays the fields present in a partial update.
    fn apply(&mut self, payload: &EventPayload) {
        if let Some(title) = &payload.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &payload.description {
            self.description = description.trim().to_string();
        }
        if let Some(location) = &payload.location {
            self.location = location.trim().to_string();
        }
        if let Some(start_time) = payload.start_time {
            self.start_time = stored_precision(start_time);
        }
        if let Some(end_time) = payload.end_time {
            self.end_time = stored_precision(end_time);
        }
        if let Some(is_public) = payload.is_public {
            self.is_public = is_public;
        }
    }

    fn validate(&self, now: DateTime<Utc>) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();

        check_text(&mut errors, "title", &self.title, Some(TITLE_MAX));
        check_text(&mut errors, "description", &self.description, None);
        check_text(&mut errors, "location", &self.location, Some(LOCATION_MAX));

        if self.end_time <= self.start_time {
            errors.add("end_time", "End time must be after start time.");
        }
        if self.start_time < now {
            errors.add("start_time", "Start time cannot be in the past.");
        }

        errors.into_result()
    }

    fn into_fields(self) -> EventFields {
        EventFields {
            title: self.title,
            description: self.description,
            location: self.location,
            start_time: timestamp(self.start_time),
            end_time: timestamp(self.end_time),
            is_public: self.is_public,
        }
    }
}

/// Timestamps are stored with microsecond precision, so the schedule is
/// validated at that precision too.
fn stored_precision(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(6)
}

fn check_text(errors: &mut FieldErrors, field: &str, value: &str, max: Option<usize>) {
    if value.is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if let Some(max) = max.filter(|max| value.chars().count() > *max) {
        errors.add(field, format!("Ensure this field has no more than {max} characters."));
    }
}
