//! HTTP surface: routing, authentication and the request handlers.

pub mod access;
pub mod auth;
mod convert;
pub mod error;
pub mod events;
pub mod middleware;
pub mod pagination;
pub mod profiles;
pub mod reviews;
pub mod rsvps;

use axum::{
    Json, Router,
    routing::{get, patch, post},
};
use serde_json::{Value, json};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Every API route, with bearer authentication applied. Transport layers
/// (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/auth/register/", post(auth::register))
        .route("/api/auth/token/", post(auth::token))
        .route("/api/events/", get(events::list_events).post(events::create_event))
        .route(
            "/api/events/{id}/",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route("/api/events/{id}/rsvp/", post(rsvps::create_rsvp))
        .route("/api/events/{id}/rsvp/{user_id}/", patch(rsvps::update_rsvp))
        .route(
            "/api/events/{id}/reviews/",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route("/api/profiles/", get(profiles::list_profiles))
        .route("/api/profiles/{id}/", get(profiles::get_profile))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::authenticate))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the Convene event management API",
        "endpoints": {
            "register": "/api/auth/register/",
            "token": "/api/auth/token/",
            "events": "/api/events/",
            "profiles": "/api/profiles/",
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
