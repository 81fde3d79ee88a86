use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::rerank::RerankTier;

/// Errors raised while reading configuration. These abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown rerank tier '{0}' (expected Nano, Small, Medium or Large)")]
    UnknownRerankTier(String),
    #[error("unknown LLM provider '{0}' (expected ollama or openai)")]
    UnknownProvider(String),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    ChunkOverlap { size: usize, overlap: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Where the SQLite database and default index paths live
    pub data_dir: PathBuf,
    /// Directory of source legal documents
    pub docs_path: PathBuf,
    /// Directory holding the persisted dense index
    pub vector_store_path: PathBuf,
    /// Build the index snapshot at startup instead of on the first question
    pub warm_index: bool,
    /// bcrypt work factor for password hashes
    pub bcrypt_cost: u32,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub reranker: RerankerConfig,
}

/// Chunking and hybrid fusion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Candidates taken from each index before fusion
    pub top_k: usize,
    pub dense_weight: f32,
    pub sparse_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            dense_weight: 0.4,
            sparse_weight: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" => Ok(LlmProvider::OpenAi),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Ollama => f.write_str("ollama"),
            LlmProvider::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Extra attempts for transient generation failures
    pub max_retries: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            max_retries: 1,
            timeout_secs: 120,
        }
    }
}

/// Configuration for the cross-encoder reranker sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the `/v1/rerank` API. Only Nano works without it.
    pub base_url: Option<String>,
    /// Where per-tier model directories are created
    pub cache_dir: PathBuf,
    /// Tier applied to every question unless the request picks one
    pub default_tier: Option<RerankTier>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            docs_path: PathBuf::from("./docs"),
            vector_store_path: data_dir.join("vector_store"),
            reranker: RerankerConfig {
                base_url: None,
                cache_dir: data_dir.join("reranker_cache"),
                default_tier: None,
                timeout_secs: 10,
            },
            data_dir,
            warm_index: false,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("LEGAL_ASSISTANT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
            config.vector_store_path = config.data_dir.join("vector_store");
            config.reranker.cache_dir = config.data_dir.join("reranker_cache");
        }
        if let Ok(addr) = std::env::var("LEGAL_ASSISTANT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("LEGAL_ASSISTANT_DOCS_PATH") {
            config.docs_path = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LEGAL_ASSISTANT_VECTOR_STORE_PATH") {
            config.vector_store_path = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LEGAL_ASSISTANT_CACHE_DIR") {
            config.reranker.cache_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_env("LEGAL_ASSISTANT_WARM_INDEX")? {
            config.warm_index = v;
        }
        if let Some(v) = parse_env("LEGAL_ASSISTANT_BCRYPT_COST")? {
            config.bcrypt_cost = v;
        }

        // Retrieval
        if let Some(v) = parse_env("LEGAL_ASSISTANT_CHUNK_SIZE")? {
            config.retrieval.chunk_size = v;
        }
        if let Some(v) = parse_env("LEGAL_ASSISTANT_CHUNK_OVERLAP")? {
            config.retrieval.chunk_overlap = v;
        }
        if let Some(v) = parse_env("LEGAL_ASSISTANT_TOP_K")? {
            config.retrieval.top_k = v;
        }
        if let Some(v) = parse_env("LEGAL_ASSISTANT_DENSE_WEIGHT")? {
            config.retrieval.dense_weight = v;
        }
        if let Some(v) = parse_env("LEGAL_ASSISTANT_SPARSE_WEIGHT")? {
            config.retrieval.sparse_weight = v;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(v) = parse_env("LLM_MAX_RETRIES")? {
            config.llm.max_retries = v;
        }
        if let Some(v) = parse_env("LLM_TIMEOUT_SECS")? {
            config.llm.timeout_secs = v;
        }

        // Reranker
        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Some(v) = parse_env::<u64>("RERANKER_TIMEOUT_SECS")? {
            config.reranker.timeout_secs = v.min(30); // Cap at 30s
        }
        if let Ok(tier) = std::env::var("RERANK_TIER") {
            config.reranker.default_tier = Some(tier.parse()?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make chunking, fusion or password hashing fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "LEGAL_ASSISTANT_CHUNK_SIZE",
                value: "0".to_string(),
            });
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(ConfigError::ChunkOverlap {
                size: r.chunk_size,
                overlap: r.chunk_overlap,
            });
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "LEGAL_ASSISTANT_BCRYPT_COST",
                value: self.bcrypt_cost.to_string(),
            });
        }
        for (key, w) in [
            ("LEGAL_ASSISTANT_DENSE_WEIGHT", r.dense_weight),
            ("LEGAL_ASSISTANT_SPARSE_WEIGHT", r.sparse_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: w.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("legal_assistant.db")
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
