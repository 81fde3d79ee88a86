use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::collections::BTreeMap;

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::ApiError;
use crate::models::{AuthResponse, LoginRequest, NewUser, SignupRequest, User};
use crate::state::AppState;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const MAX_USERNAME_LEN: usize = 150;

/// POST /api/signup/ - Register and return a token
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(req) = payload?;
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let username = required(&mut errors, "username", req.username.as_deref());
    let email = required(&mut errors, "email", req.email.as_deref());
    let password = required(&mut errors, "password", req.password.as_deref());

    if let Some(username) = &username {
        if let Some(msg) = username_problem(username) {
            errors.entry("username".into()).or_default().push(msg.into());
        } else if state.db.username_taken(username)? {
            errors
                .entry("username".into())
                .or_default()
                .push("A user with that username already exists.".into());
        }
    }
    if let Some(email) = &email {
        if !is_valid_email(email) {
            errors
                .entry("email".into())
                .or_default()
                .push("Enter a valid email address.".into());
        } else if state.db.email_taken(email)? {
            errors
                .entry("email".into())
                .or_default()
                .push("A user with that email already exists.".into());
        }
    }

    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(ApiError::Validation(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let cost = state.config.bcrypt_cost;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(anyhow::Error::from)??;

    let new_user = NewUser {
        username,
        email,
        password_hash,
        first_name: req.first_name.unwrap_or_default().trim().to_string(),
        last_name: req.last_name.unwrap_or_default().trim().to_string(),
    };

    let user = match state.db.create_user(&new_user) {
        Ok(user) => user,
        // Lost a race with a concurrent signup for the same name or email
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(ApiError::field(
                "username",
                "A user with that username or email already exists.",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let token = state.db.get_or_create_token(user.id)?;
    tracing::info!("New user {} registered", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user_id: user.id,
            email: user.email,
        }),
    ))
}

/// POST /api/login/ - Exchange email and password for a token.
///
/// The email is tried as the username first, then its local part.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;
    let mut errors = BTreeMap::new();
    let email = required(&mut errors, "email", req.email.as_deref());
    let password = required(&mut errors, "password", req.password.as_deref());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::Validation(errors));
    };

    let mut candidates = vec![email.clone()];
    if let Some((local, _)) = email.split_once('@') {
        if !local.is_empty() && local != email {
            candidates.push(local.to_string());
        }
    }

    for username in candidates {
        let Some(user) = state.db.find_user_by_username(&username)? else {
            continue;
        };
        if check_password(&password, &user).await? {
            let token = state.db.get_or_create_token(user.id)?;
            return Ok(Json(AuthResponse {
                token,
                user_id: user.id,
                email: user.email,
            }));
        }
    }

    tracing::info!("Failed login attempt");
    Err(ApiError::BadRequest("Invalid Credentials".into()))
}

/// POST /api/logout/ - Revoke the caller's token
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    state.db.delete_token(&auth.token)?;
    Ok(StatusCode::OK)
}

async fn check_password(password: &str, user: &User) -> Result<bool, ApiError> {
    let password = password.to_string();
    let hash = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(ok)
}

/// Trimmed value of a required field, recording an error if it is missing.
fn required(
    errors: &mut BTreeMap<String, Vec<String>>,
    field: &str,
    value: Option<&str>,
) -> Option<String> {
    match value.map(str::trim) {
        None => {
            errors.entry(field.into()).or_default().push(REQUIRED.into());
            None
        }
        Some("") => {
            errors.entry(field.into()).or_default().push(BLANK.into());
            None
        }
        Some(v) => Some(v.to_string()),
    }
}

fn username_problem(username: &str) -> Option<&'static str> {
    if username.chars().count() > MAX_USERNAME_LEN {
        return Some("Ensure this field has no more than 150 characters.");
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Some(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
    None
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("amina@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.ma"));
        assert!(!is_valid_email("amina"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("amina@localhost"));
        assert!(!is_valid_email("amina@example..com"));
        assert!(!is_valid_email("ami na@example.com"));
    }

    #[test]
    fn test_username_validation() {
        assert!(username_problem("amina.b+1@x").is_none());
        assert!(username_problem("أمينة").is_none());
        assert!(username_problem("bad name").is_some());
        assert!(username_problem(&"a".repeat(151)).is_some());
    }

    #[test]
    fn test_required_field_messages() {
        let mut errors = BTreeMap::new();
        assert_eq!(required(&mut errors, "a", Some(" x ")), Some("x".into()));
        assert_eq!(required(&mut errors, "b", None), None);
        assert_eq!(required(&mut errors, "c", Some("  ")), None);
        assert_eq!(errors["b"], vec![REQUIRED.to_string()]);
        assert_eq!(errors["c"], vec![BLANK.to_string()]);
        assert!(!errors.contains_key("a"));
    }
}
