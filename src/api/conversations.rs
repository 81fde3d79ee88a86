use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::Conversation;
use crate::state::AppState;

/// GET /api/conversation-history/ - The caller's conversations, newest-updated first
pub async fn conversation_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.db.list_conversations(auth.user.id)?))
}

/// POST /api/create-conversation/
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let conv = state.db.create_conversation(auth.user.id)?;
    Ok((StatusCode::CREATED, Json(conv)))
}

/// DELETE /api/delete-conversation/{id}/ - Owner only; others get 404
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let not_found = || ApiError::NotFound("Conversation not found".into());

    let id: i64 = id.parse().map_err(|_| not_found())?;
    if !state.db.delete_conversation(id, auth.user.id)? {
        return Err(not_found());
    }

    tracing::info!("Conversation {id} deleted by user {}", auth.user.id);
    Ok(Json(json!({ "message": "Conversation deleted successfully" })))
}
