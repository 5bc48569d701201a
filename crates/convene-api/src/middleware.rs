use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use convene_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Validates a bearer token when one is sent and attaches its [`Claims`] to the
/// request. Requests without an `Authorization` header pass through as
/// anonymous; a malformed or invalid token is rejected outright.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_try_get::<Authorization<Bearer>>()
        .map_err(|_| invalid_token())?;

    if let Some(Authorization(bearer)) = bearer {
        let claims = verify_token(&state.jwt_secret, bearer.token()).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            invalid_token()
        })?;
        req.extensions_mut().insert(claims);
    }

    Ok(next.run(req).await)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn invalid_token() -> ApiError {
    ApiError::Unauthorized("Given token not valid for any token type".to_string())
}

/// The authenticated caller. Extracting it on an anonymous request answers 401;
/// use `Option<AuthUser>` where anonymous access is allowed.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.sub
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided.".to_string()))
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Claims>().cloned().map(AuthUser))
    }
}
