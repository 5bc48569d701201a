use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use convene_db::queries::NewUser;
use convene_db::{Database, timestamp};
use convene_notify::Notifier;
use convene_notify::mailer::is_valid_address;
use convene_types::api::{
    Claims, RegisterRequest, RegisterResponse, RegisteredUser, TokenRequest, TokenResponse,
};

use crate::error::{ApiError, FieldErrors};

/// Lifetime of an access token.
pub const TOKEN_TTL_DAYS: i64 = 30;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 8;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub notifier: Notifier,
}

impl AppStateInner {
    /// Runs a store call on the blocking pool.
    pub async fn run_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let value = tokio::task::spawn_blocking(move || f(&db)).await??;
        Ok(value)
    }
}

/// A registration that passed validation.
#[derive(Debug)]
struct NewAccount {
    username: String,
    email: String,
    password: String,
    full_name: String,
    bio: String,
    location: String,
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let account = validate_registration(req)?;

    let user_id = Uuid::new_v4();
    let profile_id = Uuid::new_v4();
    let now = timestamp(Utc::now());
    let username = account.username.clone();
    let email = account.email.clone();

    // Hashing is CPU-bound, so it runs on the blocking pool with the insert.
    let created = state
        .run_db(move |db| {
            let password_hash = hash_password(&account.password)?;
            db.create_user_with_profile(
                &NewUser {
                    id: &user_id.to_string(),
                    profile_id: &profile_id.to_string(),
                    username: &account.username,
                    email: &account.email,
                    password_hash: &password_hash,
                    full_name: &account.full_name,
                    bio: &account.bio,
                    location: &account.location,
                },
                &now,
            )
        })
        .await?;

    if !created {
        return Err(ApiError::validation("username", "A user with that username already exists."));
    }

    info!("Registered user {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: RegisteredUser {
                id: user_id,
                username,
                email,
            },
        }),
    ))
}

pub async fn token(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<TokenRequest>, ApiError>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .run_db(move |db| {
            let Some(user) = db.get_user_by_username(&req.username)? else {
                return Ok(None);
            };
            Ok(verify_password(&req.password, &user.password)?.then_some(user))
        })
        .await?
        .ok_or_else(|| {
            ApiError::Unauthorized("No active account found with the given credentials".to_string())
        })?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow!("stored user id {} is not a uuid: {}", user.id, e))?;

    let access = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(TokenResponse {
        access,
        user_id,
        username: user.username,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a wrong password; `Err` only when the stored hash is unreadable.
fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("stored password hash is corrupt: {}", e))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

fn validate_registration(req: RegisterRequest) -> Result<NewAccount, ApiError> {
    let mut errors = FieldErrors::new();

    let username = required(&mut errors, "username", req.username.map(|s| s.trim().to_string()));
    if let Some(name) = &username {
        let len = name.chars().count();
        if len < USERNAME_MIN {
            errors.add("username", format!("Ensure this field has at least {USERNAME_MIN} characters."));
        } else if len > USERNAME_MAX {
            errors.add("username", format!("Ensure this field has no more than {USERNAME_MAX} characters."));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || "@.+-_".contains(c)) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
    }

    let email = required(&mut errors, "email", req.email.map(|s| s.trim().to_string()));
    if let Some(address) = &email {
        if !is_valid_address(address) {
            errors.add("email", "Enter a valid email address.");
        }
    }

    let password = required(&mut errors, "password", req.password);
    let password2 = required(&mut errors, "password2", req.password2);
    if let Some(pw) = &password {
        if pw.chars().count() < PASSWORD_MIN {
            errors.add(
                "password",
                format!("This password is too short. It must contain at least {PASSWORD_MIN} characters."),
            );
        }
        if pw.chars().all(|c| c.is_ascii_digit()) {
            errors.add("password", "This password is entirely numeric.");
        }
        if password2.as_ref().is_some_and(|pw2| pw2 != pw) {
            errors.add("password", "Password fields didn't match.");
        }
    }

    errors.into_result()?;

    match (username, email, password) {
        (Some(username), Some(email), Some(password)) => Ok(NewAccount {
            username,
            email,
            password,
            full_name: req.full_name,
            bio: req.bio,
            location: req.location,
        }),
        _ => Err(ApiError::Internal(anyhow!("registration validated without required fields"))),
    }
}

/// Records "required" or "blank" errors and passes a present value through.
fn required(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some(v) if v.is_empty() => {
            errors.add(field, "This field may not be blank.");
            None
        }
        Some(v) => Some(v),
    }
}
