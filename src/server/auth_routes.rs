//! Registration and login for the management API.

use anyhow::anyhow;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::session::issue_token;
use super::state::ServerState;
use crate::store::{StoreError, UserStore};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow!("{}", err))?
        .to_string())
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub async fn register(
    State(state): State<ServerState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if request.username.is_empty() || request.email.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "username and email are required"})),
        )
            .into_response();
    }
    if request.password.len() < 8 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "password must be at least 8 characters"})),
        )
            .into_response();
    }

    let hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            warn!("password hashing failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state
        .store
        .create_user(&request.username, &request.email, &hash)
    {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(StoreError::Conflict(_)) => (
            StatusCode::CONFLICT,
            Json(json!({"error": "username or email already exists"})),
        )
            .into_response(),
        Err(err) => {
            warn!("user creation failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn login(
    State(state): State<ServerState>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid username or password"})),
        )
            .into_response()
    };

    let user = match state.store.user_by_username(&request.username) {
        Ok(Some(user)) => user,
        Ok(None) => return invalid(),
        Err(err) => {
            warn!("user lookup failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !user.is_active || !verify_password(&request.password, &user.password_hash) {
        return invalid();
    }

    match issue_token(&state.jwt_secret, user.id, &user.username) {
        Ok(token) => Json(json!({"token": token, "user": user})).into_response(),
        Err(err) => {
            warn!("token issuing failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
