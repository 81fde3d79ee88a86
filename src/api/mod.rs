//! HTTP handlers, all under `/api`.

pub mod assistant;
pub mod auth;
pub mod conversations;
pub mod index;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // Token required
    let protected = Router::new()
        .route("/api/logout/", post(auth::logout))
        .route(
            "/api/conversation-history/",
            get(conversations::conversation_history),
        )
        .route(
            "/api/create-conversation/",
            post(conversations::create_conversation),
        )
        .route(
            "/api/delete-conversation/{id}/",
            delete(conversations::delete_conversation),
        )
        .route("/api/legal-assistant/", post(assistant::legal_assistant))
        .route("/api/index/refresh/", post(index::refresh_index))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    Router::new()
        .route("/api/", get(index::api_root))
        .route("/api/signup/", post(auth::signup))
        .route("/api/login/", post(auth::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
