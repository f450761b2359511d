//! JWT sessions for the management API.
//!
//! Tokens are HS256, carry `{user_id, username, iat, exp}` and expire after
//! 24 hours. The extractor pulls `Authorization: Bearer` and rejects with
//! 401 on anything malformed, expired or absent.

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::state::ServerState;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller of a management endpoint.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
}

pub fn issue_token(secret: &str, user_id: i64, username: &str) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        user_id,
        username: username.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

pub struct SessionRejection;

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid or expired token"})),
        )
            .into_response()
    }
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(SessionRejection)?;

        match verify_token(&state.jwt_secret, token) {
            Some(claims) => Ok(Session {
                user_id: claims.user_id,
                username: claims.username,
            }),
            None => {
                debug!("rejected management token");
                Err(SessionRejection)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips() {
        let token = issue_token("secret", 7, "alice").unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("secret", 7, "alice").unwrap();
        assert!(verify_token("other", &token).is_none());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_token("secret", "not.a.token").is_none());
    }
}
