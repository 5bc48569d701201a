use axum::{
    Json,
    extract::{Path, Query, State},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use convene_types::api::{Page, ProfileResponse};

use crate::auth::AppState;
use crate::convert::profile_response;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::pagination::{PageQuery, Pagination};

pub async fn list_profiles(
    State(state): State<AppState>,
    _user: AuthUser,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ApiError>,
) -> Result<Json<Page<ProfileResponse>>, ApiError> {
    let pagination = Pagination::from_query(query.page, query.page_size)?;

    let (count, rows) = state
        .run_db(move |db| db.list_profiles(pagination.limit(), pagination.offset()))
        .await?;
    let results = rows.into_iter().map(profile_response).collect();

    Ok(Json(pagination.wrap(count, results)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    _user: AuthUser,
    WithRejection(Path(profile_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let id = profile_id.to_string();
    let row = state
        .run_db(move |db| db.get_profile(&id))
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(profile_response(row)))
}
