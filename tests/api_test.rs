//! HTTP-level tests against the real router with stub model providers.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use common::{test_state, test_state_with_db, EchoChatModel, FailingChatModel};
use legal_assistant::api;
use legal_assistant::models::Role;
use legal_assistant::state::AppState;

struct TestApp {
    app: Router,
    state: AppState,
    _dir: tempfile::TempDir,
}

fn app_with(chat_model: Arc<dyn legal_assistant::llm::generate::ChatModel>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(dir.path(), chat_model);
    TestApp {
        app: api::router(state.clone()),
        state,
        _dir: dir,
    }
}

fn app() -> TestApp {
    app_with(Arc::new(EchoChatModel))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Token {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn signup(app: &Router, username: &str, email: &str) -> (String, i64) {
    let (status, body) = send(
        app,
        "POST",
        "/api/signup/",
        None,
        Some(json!({
            "username": username,
            "email": email,
            "password": "correct-horse",
            "first_name": "Test",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn test_api_root_is_public() {
    let t = app();
    let (status, body) = send(&t.app, "GET", "/api/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["legal-assistant"], "/api/legal-assistant/");
}

#[tokio::test]
async fn test_signup_returns_token() {
    let t = app();
    let (token, user_id) = signup(&t.app, "amina", "amina@example.com").await;
    assert_eq!(token.len(), 40);

    let user = t.state.db.find_user_by_id(user_id).unwrap().unwrap();
    assert_eq!(user.email, "amina@example.com");
    assert_ne!(user.password_hash, "correct-horse");
}

#[tokio::test]
async fn test_signup_validation_errors() {
    let t = app();
    let (status, body) = send(
        &t.app,
        "POST",
        "/api/signup/",
        None,
        Some(json!({ "username": "", "email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["username"][0], "This field may not be blank.");
    assert_eq!(body["email"][0], "Enter a valid email address.");
    assert_eq!(body["password"][0], "This field is required.");
}

#[tokio::test]
async fn test_signup_duplicate_email() {
    let t = app();
    signup(&t.app, "amina", "amina@example.com").await;
    let (status, body) = send(
        &t.app,
        "POST",
        "/api/signup/",
        None,
        Some(json!({
            "username": "amina2",
            "email": "amina@example.com",
            "password": "pw",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("email").is_some());
}

#[tokio::test]
async fn test_login_with_email_or_local_part() {
    let t = app();
    // Username equals the email
    let (token_a, id_a) = signup(&t.app, "amina@example.com", "amina@example.com").await;
    // Username equals the local part
    let (_, id_b) = signup(&t.app, "omar", "omar@example.com").await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/login/",
        None,
        Some(json!({ "email": "amina@example.com", "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], id_a);
    assert_eq!(body["token"], token_a.as_str());

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/login/",
        None,
        Some(json!({ "email": "omar@example.com", "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], id_b);
    assert_eq!(body["email"], "omar@example.com");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let t = app();
    signup(&t.app, "omar", "omar@example.com").await;
    let (status, body) = send(
        &t.app,
        "POST",
        "/api/login/",
        None,
        Some(json!({ "email": "omar@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid Credentials");
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let t = app();
    let (token, _) = signup(&t.app, "omar", "omar@example.com").await;

    let (status, _) = send(&t.app, "POST", "/api/logout/", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        "GET",
        "/api/conversation-history/",
        Some(token.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_protected_routes_need_token() {
    let t = app();
    for (method, uri) in [
        ("GET", "/api/conversation-history/"),
        ("POST", "/api/create-conversation/"),
        ("DELETE", "/api/delete-conversation/1/"),
        ("POST", "/api/legal-assistant/"),
        ("POST", "/api/index/refresh/"),
    ] {
        let (status, _) = send(&t.app, method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        let (status, _) = send(&t.app, method, uri, Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_bearer_scheme_accepted() {
    let t = app();
    let (token, _) = signup(&t.app, "omar", "omar@example.com").await;
    let request = Request::builder()
        .method("GET")
        .uri("/api/conversation-history/")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_conversation_history_ordering() {
    let t = app();
    let (token, user_id) = signup(&t.app, "omar", "omar@example.com").await;

    let (status, first) = send(&t.app, "POST", "/api/create-conversation/", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["messages"], json!([]));
    let (_, second) = send(&t.app, "POST", "/api/create-conversation/", Some(token.as_str()), None).await;

    let first_id = first["id"].as_i64().unwrap();
    for i in 0..4 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        t.state.db.append_message(first_id, role, &format!("turn {i}")).unwrap();
    }
    std::thread::sleep(std::time::Duration::from_millis(2));
    t.state.db.touch_conversation(first_id).unwrap();

    // Someone else's conversation never shows up
    let (_, other_id) = signup(&t.app, "amina", "amina@example.com").await;
    t.state.db.create_conversation(other_id).unwrap();

    let (status, body) = send(&t.app, "GET", "/api/conversation-history/", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    let convs = body.as_array().unwrap();
    assert_eq!(convs.len(), 2);
    assert_eq!(convs[0]["id"], first_id);
    assert_eq!(convs[1]["id"], second["id"]);

    let messages = convs[0]["messages"].as_array().unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["turn 0", "turn 1", "turn 2", "turn 3"]);
    let stamps: Vec<&str> = messages.iter().map(|m| m["timestamp"].as_str().unwrap()).collect();
    let parsed: Vec<chrono::DateTime<chrono::Utc>> =
        stamps.iter().map(|s| s.parse().unwrap()).collect();
    assert!(parsed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(messages[1]["role"], "assistant");
    assert!(t.state.db.find_user_by_id(user_id).unwrap().is_some());
}

#[tokio::test]
async fn test_delete_conversation_owner_only() {
    let t = app();
    let (owner, owner_id) = signup(&t.app, "omar", "omar@example.com").await;
    let (intruder, _) = signup(&t.app, "amina", "amina@example.com").await;

    let conv = t.state.db.create_conversation(owner_id).unwrap();
    t.state.db.append_message(conv.id, Role::User, "hello").unwrap();
    let uri = format!("/api/delete-conversation/{}/", conv.id);

    let (status, body) = send(&t.app, "DELETE", &uri, Some(intruder.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Conversation not found");
    assert_eq!(t.state.db.messages(conv.id).unwrap().len(), 1);

    let (status, body) = send(&t.app, "DELETE", &uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Conversation deleted successfully");
    assert!(t.state.db.find_conversation(conv.id, owner_id).unwrap().is_none());

    let (status, _) = send(&t.app, "DELETE", &uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&t.app, "DELETE", "/api/delete-conversation/abc/", Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_legal_assistant_new_conversation() {
    let t = app();
    let (token, user_id) = signup(&t.app, "omar", "omar@example.com").await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({
            "language": "English",
            "prompt": "What is tenancy notice period?",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!body["answer"].as_str().unwrap().is_empty());
    assert!(body["response_time"].as_f64().unwrap() >= 0.0);

    let conv_id = body["conversation_id"].as_i64().unwrap();
    let conv = t.state.db.find_conversation(conv_id, user_id).unwrap().unwrap();
    assert_eq!(conv.messages.len(), 2);
    assert_eq!(conv.messages[0].role, Role::User);
    assert_eq!(conv.messages[0].content, "What is tenancy notice period?");
    assert_eq!(conv.messages[1].role, Role::Assistant);
    assert!(conv.updated_at > conv.created_at);
}

#[tokio::test]
async fn test_legal_assistant_continues_conversation() {
    let t = app();
    let (token, user_id) = signup(&t.app, "omar", "omar@example.com").await;
    let conv = t.state.db.create_conversation(user_id).unwrap();

    let ask = |prompt: &'static str| {
        json!({ "prompt": prompt, "conversation_id": conv.id, "language": "عربي" })
    };
    let (status, body) = send(&t.app, "POST", "/api/legal-assistant/", Some(token.as_str()), Some(ask("ما هي مدة الإشعار؟"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["conversation_id"], conv.id);
    let after_first = t.state.db.find_conversation(conv.id, user_id).unwrap().unwrap();

    let (status, _) = send(&t.app, "POST", "/api/legal-assistant/", Some(token.as_str()), Some(ask("والطلاق؟"))).await;
    assert_eq!(status, StatusCode::OK);
    let after_second = t.state.db.find_conversation(conv.id, user_id).unwrap().unwrap();

    assert_eq!(after_second.messages.len(), 4);
    assert!(after_second.updated_at > after_first.updated_at);
}

#[tokio::test]
async fn test_foreign_conversation_id_starts_new_one() {
    let t = app();
    let (_, owner_id) = signup(&t.app, "omar", "omar@example.com").await;
    let (token, other_id) = signup(&t.app, "amina", "amina@example.com").await;
    let foreign = t.state.db.create_conversation(owner_id).unwrap();

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "Quel est le préavis ?", "conversation_id": foreign.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["conversation_id"], foreign.id);
    assert!(t.state.db.messages(foreign.id).unwrap().is_empty());
    assert_eq!(t.state.db.list_conversations(other_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_generation_leaves_no_orphan() {
    let model = Arc::new(FailingChatModel {
        calls: AtomicUsize::new(0),
    });
    let t = app_with(model.clone());
    let (token, user_id) = signup(&t.app, "omar", "omar@example.com").await;
    let existing = t.state.db.create_conversation(user_id).unwrap();

    // Implicitly created conversation is removed
    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "What is tenancy notice period?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("503"));
    // One retry for the transient 503
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    let convs = t.state.db.list_conversations(user_id).unwrap();
    assert_eq!(convs.len(), 1);
    assert_eq!(convs[0].id, existing.id);

    // Existing conversation survives without the failed turn
    let (status, _) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "Again?", "conversation_id": existing.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(t.state.db.messages(existing.id).unwrap().is_empty());
    assert!(t.state.db.find_conversation(existing.id, user_id).unwrap().is_some());
}

#[tokio::test]
async fn test_failed_answer_store_leaves_no_orphan() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store.db");
    let db = legal_assistant::db::Database::open(&db_path).unwrap();
    let (state, _) = test_state_with_db(dir.path(), Arc::new(EchoChatModel), db);
    let app = api::router(state.clone());
    let (token, user_id) = signup(&app, "omar", "omar@example.com").await;
    let existing = state.db.create_conversation(user_id).unwrap();

    // Answers are generated but can no longer be stored
    let other = rusqlite::Connection::open(&db_path).unwrap();
    other
        .execute_batch(
            "CREATE TRIGGER reject_assistant BEFORE INSERT ON messages
             WHEN NEW.role = 'assistant'
             BEGIN SELECT RAISE(ABORT, 'assistant messages rejected'); END;",
        )
        .unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "What is tenancy notice period?" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let convs = state.db.list_conversations(user_id).unwrap();
    assert_eq!(convs.len(), 1);
    assert_eq!(convs[0].id, existing.id);

    let (status, _) = send(
        &app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "Again?", "conversation_id": existing.id })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.db.messages(existing.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_legal_assistant_validation() {
    let t = app();
    let (token, user_id) = signup(&t.app, "omar", "omar@example.com").await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "hello", "language": "Klingon" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["language"][0].as_str().unwrap().contains("Klingon"));

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("prompt").is_some());

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({ "prompt": "hello", "rerank_tier": "Huge" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["rerank_tier"][0].as_str().unwrap().contains("Huge"));

    // Nothing was written by rejected requests
    assert!(t.state.db.list_conversations(user_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_legal_assistant_with_nano_rerank() {
    let t = app();
    let (token, _) = signup(&t.app, "omar", "omar@example.com").await;
    let (status, body) = send(
        &t.app,
        "POST",
        "/api/legal-assistant/",
        Some(token.as_str()),
        Some(json!({
            "prompt": "What is tenancy notice period?",
            "language": "English",
            "rerank_tier": "Nano",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["conversation_id"].is_i64());
}

#[tokio::test]
async fn test_index_refresh() {
    let t = app();
    let (token, _) = signup(&t.app, "omar", "omar@example.com").await;
    let (status, body) = send(&t.app, "POST", "/api/index/refresh/", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["chunks"].as_u64().unwrap() >= 3);
    assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
}
