use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::llm::generate::generate_answer;
use crate::llm::prompt::Language;
use crate::llm::rerank::RerankTier;
use crate::models::{AssistantRequest, AssistantResponse, Message, Role, SearchHit};
use crate::state::AppState;

/// POST /api/legal-assistant/ - Answer a legal question within a conversation.
///
/// A missing or foreign `conversation_id` starts a new conversation.
pub async fn legal_assistant(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("legal_assistant", %request_id, user_id = auth.user.id);
    ask(state, auth, payload).instrument(span).await
}

async fn ask(
    state: AppState,
    auth: AuthUser,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantResponse>, ApiError> {
    let Json(req) = payload?;

    let language = match req.language.as_deref() {
        Some(name) => name
            .parse::<Language>()
            .map_err(|e| ApiError::field("language", e.to_string()))?,
        None => Language::default(),
    };

    let prompt = match req.prompt.as_deref().map(str::trim) {
        None => return Err(ApiError::field("prompt", "This field is required.")),
        Some("") => return Err(ApiError::field("prompt", "This field may not be blank.")),
        Some(p) => p.to_string(),
    };

    let tier = match req.rerank_tier.as_deref() {
        Some(name) => Some(
            name.parse::<RerankTier>()
                .map_err(|e| ApiError::field("rerank_tier", e.to_string()))?,
        ),
        None => state.config.reranker.default_tier,
    };

    let user_id = auth.user.id;
    let existing = match req.conversation_id {
        Some(id) => state.db.find_conversation(id, user_id)?,
        None => None,
    };
    let (conversation_id, created) = match existing {
        Some(conv) => (conv.id, false),
        None => (state.db.create_conversation(user_id)?.id, true),
    };

    let user_message = state.db.append_message(conversation_id, Role::User, &prompt)?;

    let (answer, response_time) =
        match complete_turn(&state, conversation_id, language, &prompt, tier).await {
            Ok(done) => done,
            Err(e) => {
                rollback(&state, &user_message, created, user_id);
                return Err(e);
            }
        };

    tracing::info!(
        "Answered in conversation {conversation_id} ({language}) in {response_time:.2}s"
    );

    Ok(Json(AssistantResponse {
        answer,
        response_time,
        conversation_id,
    }))
}

/// Steps that run once the user message is stored. On error the caller rolls
/// that message back; a stored answer is removed if the bump fails.
async fn complete_turn(
    state: &AppState,
    conversation_id: i64,
    language: Language,
    prompt: &str,
    tier: Option<RerankTier>,
) -> Result<(String, f64), ApiError> {
    let chat_history = format_chat_history(&state.db.messages(conversation_id)?);

    let start = Instant::now();
    let answer = answer_question(state, language, prompt, &chat_history, tier).await?;

    let reply = state
        .db
        .append_message(conversation_id, Role::Assistant, &answer)?;
    if let Err(e) = state.db.touch_conversation(conversation_id) {
        if let Err(del) = state.db.delete_message(reply.id) {
            tracing::error!("Failed to roll back message {}: {del}", reply.id);
        }
        return Err(e.into());
    }
    Ok((answer, start.elapsed().as_secs_f64()))
}

/// Retrieve, optionally rerank, then generate.
async fn answer_question(
    state: &AppState,
    language: Language,
    question: &str,
    chat_history: &str,
    tier: Option<RerankTier>,
) -> Result<String, ApiError> {
    let mut hits = state.retrieval.retrieve(question).await?;
    if let Some(tier) = tier {
        hits = state.reranker.rerank(question, hits, tier).await?;
    }
    tracing::debug!("Using {} passages as context", hits.len());

    let context = build_context(&hits);
    let answer = generate_answer(
        state.chat_model.as_ref(),
        language,
        &context,
        chat_history,
        question,
        state.config.llm.max_retries,
    )
    .await?;

    tracing::debug!(
        "{} generated {} chars in {:?}",
        state.chat_model.model(),
        answer.text.len(),
        answer.elapsed
    );
    Ok(answer.text)
}

/// Undo the writes of a request whose answer could not be produced.
fn rollback(state: &AppState, user_message: &Message, created: bool, user_id: i64) {
    if let Err(e) = state.db.delete_message(user_message.id) {
        tracing::error!("Failed to roll back message {}: {e}", user_message.id);
    }
    if created {
        if let Err(e) = state
            .db
            .delete_conversation(user_message.conversation_id, user_id)
        {
            tracing::error!(
                "Failed to roll back conversation {}: {e}",
                user_message.conversation_id
            );
        }
    }
}

/// One `role: content` line per message, oldest first.
fn format_chat_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(role: Role, content: &str) -> Message {
        Message {
            id: 0,
            conversation_id: 1,
            content: content.into(),
            role,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_format_chat_history() {
        let history = format_chat_history(&[
            message(Role::User, "Bonjour"),
            message(Role::Assistant, "Bonjour, comment puis-je aider ?"),
            message(Role::User, "Quel est le préavis ?"),
        ]);
        assert_eq!(
            history,
            "user: Bonjour\nassistant: Bonjour, comment puis-je aider ?\nuser: Quel est le préavis ?"
        );
        assert_eq!(format_chat_history(&[]), "");
    }

    #[test]
    fn test_build_context_joins_with_blank_line() {
        let hit = |content: &str| SearchHit {
            chunk_id: 0,
            source: "a.txt".into(),
            page: 1,
            content: content.into(),
            dense_score: 0.0,
            sparse_score: 0.0,
            combined_score: 0.0,
            rerank_score: None,
        };
        assert_eq!(build_context(&[hit("one"), hit("two")]), "one\n\ntwo");
        assert_eq!(build_context(&[]), "");
    }
}
