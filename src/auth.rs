//! Password hashing, token keys and the token-auth middleware.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::RngCore;

use crate::error::ApiError;
use crate::models::User;
use crate::state::AppState;

/// Authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

pub fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// 40 hex characters from 20 random bytes.
pub fn generate_token_key() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Key from an `Authorization: Token <key>` or `Bearer <key>` header.
fn token_from_header(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(key)
    } else {
        None
    }
}

/// Reject requests without a valid token; attach the [`AuthUser`] otherwise.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(header) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return ApiError::Unauthorized("Authentication credentials were not provided.".into())
            .into_response();
    };

    let Some(key) = token_from_header(header).map(str::to_string) else {
        return ApiError::Unauthorized("Invalid token header.".into()).into_response();
    };

    match state.db.user_for_token(&key) {
        Ok(Some(user)) => {
            req.extensions_mut().insert(AuthUser { user, token: key });
            next.run(req).await
        }
        Ok(None) => ApiError::Unauthorized("Invalid token.".into()).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
