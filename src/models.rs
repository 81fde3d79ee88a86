use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded slice of a source document, the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Position in the chunk sequence; shared by the dense and sparse index.
    pub id: usize,
    /// Path of the source file relative to the documents directory
    pub source: String,
    /// 1-based page number
    pub page: usize,
    pub content: String,
}

/// A fused retrieval result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: usize,
    pub source: String,
    pub page: usize,
    pub content: String,
    pub dense_score: f32,
    pub sparse_score: f32,
    pub combined_score: f32,
    pub rerank_score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// A registered account
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: DateTime<Utc>,
}

/// Fields for a user about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// A single chat turn
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    #[serde(skip)]
    pub conversation_id: i64,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

/// A conversation with its messages in chat order
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// Signup request. Every field is optional so missing ones can be reported per field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Returned by signup and login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i64,
    pub email: String,
}

/// Question for the assistant
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantRequest {
    /// "French" (default), "English" or "عربي"
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub conversation_id: Option<i64>,
    /// Nano, Small, Medium or Large; falls back to the configured tier
    pub rerank_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub answer: String,
    /// Seconds spent on retrieval and generation
    pub response_time: f64,
    pub conversation_id: i64,
}

/// Summary of a rebuilt index snapshot
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub chunks: usize,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(Role::Assistant).unwrap();
        assert_eq!(json, "assistant");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_conversation_json_shape() {
        let now = Utc::now();
        let conv = Conversation {
            id: 7,
            user_id: 1,
            created_at: now,
            updated_at: now,
            messages: vec![Message {
                id: 3,
                conversation_id: 7,
                content: "hello".into(),
                role: Role::User,
                timestamp: now,
            }],
        };
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["id"], 7);
        assert!(json.get("user_id").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json["messages"][0].get("conversation_id").is_none());
    }
}
