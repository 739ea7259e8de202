//! Authentication
//!
//! One random token per process lifetime, checked against either the
//! `Authorization: Bearer <token>` header or a `pw_token` cookie.
//! Missing or mismatched token yields 401.

use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Extractor that enforces the per-process token on protected routes.
pub struct AuthToken;

#[async_trait]
impl FromRequestParts<AppState> for AuthToken {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = bearer_token(parts).or_else(|| cookie_token(parts));
        match presented {
            Some(token) if token == *state.token => Ok(AuthToken),
            _ => Err(AuthError::Unauthorized),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                let mut kv = cookie.trim().splitn(2, '=');
                match (kv.next(), kv.next()) {
                    (Some("pw_token"), Some(v)) => Some(v.to_string()),
                    _ => None,
                }
            })
        })
}

#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "missing or invalid token"})),
        )
            .into_response()
    }
}

/// `GET /api/token` -- the one unauthenticated endpoint, handing the UI
/// its token for the rest of the session.
pub async fn issue_token(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({"token": state.token.as_ref()}))
}
