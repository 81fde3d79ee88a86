use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::llm::generate::{ChatModel, HttpChatModel};
use crate::llm::rerank::Reranker;
use crate::search::RetrievalService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub retrieval: Arc<RetrievalService>,
    pub chat_model: Arc<dyn ChatModel>,
    pub reranker: Arc<Reranker>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()?;

        let db = Database::open(&config.db_path())?;
        let embedder = Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let chat_model = Arc::new(HttpChatModel::new(http_client.clone(), config.llm.clone()));
        let reranker = Reranker::new(http_client, config.reranker.clone());

        Ok(Self::with_providers(config, db, embedder, chat_model, reranker))
    }

    /// Assemble state around already-built providers.
    pub fn with_providers(
        config: Config,
        db: Database,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
        reranker: Reranker,
    ) -> Self {
        let retrieval = RetrievalService::new(
            config.docs_path.clone(),
            config.vector_store_path.clone(),
            config.retrieval.clone(),
            embedder,
        );

        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            retrieval: Arc::new(retrieval),
            chat_model,
            reranker: Arc::new(reranker),
        }
    }
}
