use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::IndexStatus;
use crate::state::AppState;

/// GET /api/ - Endpoint directory
pub async fn api_root() -> Json<Value> {
    Json(json!({
        "signup": "/api/signup/",
        "login": "/api/login/",
        "logout": "/api/logout/",
        "conversation-history": "/api/conversation-history/",
        "create-conversation": "/api/create-conversation/",
        "delete-conversation": "/api/delete-conversation/{id}/",
        "legal-assistant": "/api/legal-assistant/",
        "index-refresh": "/api/index/refresh/",
    }))
}

/// POST /api/index/refresh/ - Re-ingest the corpus and swap in a new snapshot
pub async fn refresh_index(State(state): State<AppState>) -> Result<Json<IndexStatus>, ApiError> {
    let snapshot = state.retrieval.refresh().await?;
    let status = snapshot.status();
    tracing::info!("Index refreshed: {} chunks", status.chunks);
    Ok(Json(status))
}
