//! Accounts, password hashing and bearer-token sessions.
//!
//! Login hands out a random 32-byte token (base64url). Only its blake3
//! digest is stored, so a leaked database does not leak live sessions.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tasktide_shared::constants::MIN_PASSWORD_LEN;
use tasktide_shared::{ThemePreference, UserId};
use tasktide_store::{Session, StoreError, User};

use crate::api::AppState;
use crate::error::ServerError;

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub token_hash: String,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Argon2 is deliberately slow, so run it off the async workers.
async fn hash_password_blocking(password: String) -> Result<String, ServerError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))?
}

async fn verify_password_blocking(password: String, hash: String) -> Result<bool, ServerError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))
}

/// Generate a 32-byte random bearer token, base64url encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn token_digest(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

fn normalize_email(email: &str) -> Result<String, ServerError> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid {
        return Err(ServerError::BadRequest("Valid email is required".to_string()));
    }
    Ok(email)
}

fn check_password_len(password: &str) -> Result<(), ServerError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServerError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn issue_session(state: &AppState, user: UserId) -> Result<String, ServerError> {
    let token = generate_token();
    let now = Utc::now();
    let session = Session {
        token_hash: token_digest(&token),
        user_id: user,
        created_at: now,
        expires_at: now + state.config.session_ttl(),
    };
    state.db()?.create_session(&session)?;
    Ok(token)
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Resolve `Authorization: Bearer <token>` to a user or reject with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServerError::Unauthorized("No token, authorization denied".to_string()))?;

    let token_hash = token_digest(token);
    let user = state
        .db()?
        .session_user(&token_hash, Utc::now())?
        .ok_or_else(|| ServerError::Unauthorized("Token is not valid".to_string()))?;

    req.extensions_mut().insert(AuthUser {
        id: user,
        token_hash,
    });
    Ok(next.run(req).await)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    if !state.config.registration_open {
        return Err(ServerError::Forbidden("Registration is closed".to_string()));
    }

    let email = normalize_email(&req.email)?;
    check_password_len(&req.password)?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ServerError::BadRequest("Name is required".to_string()));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let user = User {
        id: UserId::new(),
        email,
        password_hash,
        name,
        points: 0,
        streak: 0,
        theme_preference: ThemePreference::default(),
        created_at: Utc::now(),
    };

    state.db()?.create_user(&user)?;
    let token = issue_session(&state, user.id)?;

    info!(user = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let invalid = || ServerError::Unauthorized("Invalid credentials".to_string());

    let email = req.email.trim().to_lowercase();
    let lookup = state.db()?.get_user_by_email(&email);
    let user = match lookup {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        debug!(user = %user.id, "Rejected login");
        return Err(invalid());
    }

    let token = issue_session(&state, user.id)?;
    info!(user = %user.id, "User logged in");
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>, ServerError> {
    let user = state.db()?.get_user(auth.id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound("User not found".to_string()),
        other => other.into(),
    })?;
    Ok(Json(user))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.db()?.delete_session(&auth.token_hash)?;
    Ok(Json(serde_json::json!({ "message": "Logged out" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub theme_preference: Option<ThemePreference>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ServerError> {
    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(ServerError::BadRequest("Name cannot be empty".to_string())),
        other => other,
    };
    let user = state
        .db()?
        .update_profile(auth.id, name, req.theme_preference)?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    check_password_len(&req.new_password)?;

    let current_hash = state.db()?.get_user(auth.id)?.password_hash;
    if !verify_password_blocking(req.current_password, current_hash).await? {
        return Err(ServerError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password_blocking(req.new_password).await?;
    state.db()?.update_password_hash(auth.id, &new_hash)?;

    info!(user = %auth.id, "Password changed");
    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}
