use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use rand_core::OsRng;
use thiserror::Error;
use tracing::{debug, error, info};

use yaarfetch_db::Database;
use yaarfetch_types::api::{Claims, LoginRequest, RegisterRequest, TokenResponse, UserPublic};
use yaarfetch_types::models::User;
use yaarfetch_types::validate::{Validate, normalize_email};
use yaarfetch_types::RecordId;

use crate::db_call;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Why a bearer token was rejected. All variants surface as 401.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed or has a bad signature")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token subject does not resolve to a user")]
    UnknownSubject,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let email = normalize_email(&req.email);

    let taken = {
        let email = email.clone();
        db_call(&state, move |db| db.get_user_by_email(&email)).await?
    };
    if taken.is_some() {
        return Err(ApiError::Conflict("Email already registered"));
    }

    let password_hash = hash_password(req.password).await?;

    let user = User {
        id: RecordId::new(),
        name: req.name.trim().to_string(),
        email,
        phone: req
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
        created_at: chrono::Utc::now(),
    };

    let inserted = {
        let user = user.clone();
        db_call(&state, move |db| db.create_user(&user, &password_hash)).await?
    };
    if !inserted {
        // Lost a race against a concurrent registration for the same address.
        return Err(ApiError::Conflict("Email already registered"));
    }

    info!("Registered user {}", user.id);

    let token = create_token(&state.jwt_secret, user.id, state.token_ttl).map_err(|e| {
        error!("Failed to sign token: {}", e);
        ApiError::Internal
    })?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse::bearer(token, UserPublic::from(&user))),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = ApiError::Unauthorized("Invalid credentials");

    if req.validate().is_err() {
        return Err(invalid);
    }

    let email = normalize_email(&req.email);
    let Some(stored) = db_call(&state, move |db| db.get_user_by_email(&email)).await? else {
        return Err(invalid);
    };

    if !verify_password(req.password, stored.password_hash).await? {
        return Err(invalid);
    }

    let token = create_token(&state.jwt_secret, stored.user.id, state.token_ttl).map_err(|e| {
        error!("Failed to sign token: {}", e);
        ApiError::Internal
    })?;

    Ok(Json(TokenResponse::bearer(token, UserPublic::from(&stored.user))))
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserPublic> {
    Json(UserPublic::from(&user))
}

/// Resolve a bearer token to the user it was issued for.
///
/// Every token failure becomes the same 401; the specific cause is only logged.
pub async fn resolve(state: &AppState, token: &str) -> Result<User, ApiError> {
    let user_id = decode_token(&state.jwt_secret, token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::credentials()
    })?;

    db_call(state, move |db| db.get_user(user_id))
        .await?
        .ok_or_else(|| {
            debug!("Rejected bearer token: {} ({})", TokenError::UnknownSubject, user_id);
            ApiError::credentials()
        })
}

pub fn create_token(
    secret: &str,
    user_id: RecordId,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Result<RecordId, TokenError> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    })?;

    RecordId::parse(&data.claims.sub).map_err(|_| {
        debug!("Token subject is not an identifier");
        TokenError::Malformed
    })
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })?
    .map_err(|e| {
        error!("Password hashing failed: {}", e);
        ApiError::Internal
    })
}

async fn verify_password(password: String, password_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)?;
        Ok::<_, argon2::password_hash::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })?
    .map_err(|e| {
        error!("Stored password hash is unreadable: {}", e);
        ApiError::Internal
    })
}
