//! Stub providers and corpus helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use legal_assistant::config::Config;
use legal_assistant::db::Database;
use legal_assistant::llm::embeddings::Embedder;
use legal_assistant::llm::generate::ChatModel;
use legal_assistant::llm::rerank::Reranker;
use legal_assistant::llm::{ProviderError, Service};
use legal_assistant::state::AppState;

const DIMS: usize = 16;

/// Bag-of-words embedder: each lowercase word is hashed into one of 16 buckets.
#[derive(Default)]
pub struct HashEmbedder {
    /// Texts embedded so far
    pub embedded: AtomicUsize,
}

impl HashEmbedder {
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

fn bucket(word: &str) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    word.hash(&mut hasher);
    (hasher.finish() % DIMS as u64) as usize
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash-embed-16"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    v[bucket(&word.to_lowercase())] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Answers with a fixed prefix plus the tail of the prompt it was given.
pub struct EchoChatModel;

#[async_trait]
impl ChatModel for EchoChatModel {
    fn model(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let lines = prompt.lines().count();
        Ok(format!("Based on the provided texts ({lines} prompt lines): one month's notice."))
    }
}

/// Always fails as an overloaded provider would.
pub struct FailingChatModel {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for FailingChatModel {
    fn model(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Status {
            service: Service::Generation,
            status: 503,
            body: "overloaded".into(),
        })
    }
}

/// Write a small legal corpus into `dir`.
pub fn write_corpus(dir: &Path) {
    std::fs::create_dir_all(dir.join("tenancy")).unwrap();
    std::fs::write(
        dir.join("tenancy/notice.txt"),
        "Article 12. The tenant must give the landlord one month written notice \
         before leaving the premises.\n\nArticle 13. The notice period for the \
         landlord is three months.",
    )
    .unwrap();
    std::fs::write(
        dir.join("family.md"),
        "Divorce proceedings begin with a petition filed at the family court.\n\n\
         Custody decisions consider the best interest of the child.",
    )
    .unwrap();
    std::fs::write(
        dir.join("labour.txt"),
        "An employee dismissed without cause is entitled to severance pay \
         proportional to seniority.",
    )
    .unwrap();
}

/// Config rooted in `root`, with cheap bcrypt and small chunks.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = root.join("data");
    config.docs_path = root.join("docs");
    config.vector_store_path = root.join("data/vector_store");
    config.reranker.cache_dir = root.join("data/reranker_cache");
    config.bcrypt_cost = 4;
    config.retrieval.chunk_size = 200;
    config.retrieval.chunk_overlap = 20;
    config.llm.max_retries = 1;
    config
}

pub fn test_state(root: &Path, chat_model: Arc<dyn ChatModel>) -> (AppState, Arc<HashEmbedder>) {
    test_state_with_db(root, chat_model, Database::open_in_memory().unwrap())
}

pub fn test_state_with_db(
    root: &Path,
    chat_model: Arc<dyn ChatModel>,
    db: Database,
) -> (AppState, Arc<HashEmbedder>) {
    let config = test_config(root);
    write_corpus(&config.docs_path);
    let embedder = Arc::new(HashEmbedder::default());
    let reranker = Reranker::new(reqwest::Client::new(), config.reranker.clone());
    let state = AppState::with_providers(
        config,
        db,
        embedder.clone(),
        chat_model,
        reranker,
    );
    (state, embedder)
}
