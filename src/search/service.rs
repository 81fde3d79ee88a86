use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::ingest::{self, ChunkConfig, IngestError};
use crate::llm::embeddings::Embedder;
use crate::llm::ProviderError;
use crate::models::{DocumentChunk, IndexStatus, SearchHit};
use crate::search::bm25::Bm25Index;
use crate::search::hybrid::{weighted_rrf_fusion, FusionWeights, QueryResults};
use crate::search::vector::VectorStore;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("index error: {0:#}")]
    Index(#[from] anyhow::Error),
}

/// Dense and sparse indexes built from one chunk sequence.
pub struct IndexSnapshot {
    pub chunks: Vec<DocumentChunk>,
    pub dense: VectorStore,
    pub sparse: Bm25Index,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            chunks: self.chunks.len(),
            fingerprint: self.fingerprint.clone(),
            built_at: self.built_at,
        }
    }
}

/// Owns the published index snapshot and rebuilds it on demand.
pub struct RetrievalService {
    docs_path: PathBuf,
    vector_store_path: PathBuf,
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    /// Held for the whole of a build so only one runs at a time
    build_lock: tokio::sync::Mutex<()>,
}

impl RetrievalService {
    pub fn new(
        docs_path: PathBuf,
        vector_store_path: PathBuf,
        config: RetrievalConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            docs_path,
            vector_store_path,
            config,
            embedder,
            snapshot: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The published snapshot, if any.
    pub fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Drop the published snapshot; the next request rebuilds it.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
        tracing::info!("Index snapshot invalidated");
    }

    /// Return the published snapshot, building it first if there is none.
    pub async fn ensure_loaded(&self) -> Result<Arc<IndexSnapshot>, RetrievalError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let _guard = self.build_lock.lock().await;
        // Another request may have finished a build while we waited
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.build().await?);
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Re-ingest the corpus and publish a new snapshot. On failure the
    /// previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<Arc<IndexSnapshot>, RetrievalError> {
        let _guard = self.build_lock.lock().await;
        let snapshot = Arc::new(self.build().await?);
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Hybrid retrieval: top `top_k` from each index, fused by weighted RRF.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, RetrievalError> {
        let snapshot = self.ensure_loaded().await?;
        if snapshot.chunks.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let top_k = self.config.top_k;
        let query_embedding = self.embedder.embed_one(query).await?;

        let results = QueryResults {
            vector_hits: snapshot.dense.search(&query_embedding, top_k),
            bm25_hits: snapshot.sparse.search(query, top_k)?,
        };

        let hits = weighted_rrf_fusion(
            &results,
            FusionWeights::from(&self.config),
            &snapshot.chunks,
            top_k * 2,
        );
        tracing::debug!(
            "Retrieved {} passages ({} dense, {} sparse)",
            hits.len(),
            results.vector_hits.len(),
            results.bm25_hits.len()
        );
        Ok(hits)
    }

    async fn build(&self) -> Result<IndexSnapshot, RetrievalError> {
        let started = std::time::Instant::now();

        // 1. Ingest and split
        let docs_path = self.docs_path.clone();
        let chunk_config = ChunkConfig::from(&self.config);
        let chunks = tokio::task::spawn_blocking(move || {
            let docs = ingest::load_documents(&docs_path)?;
            Ok::<_, IngestError>(ingest::split_documents(&docs, &chunk_config))
        })
        .await
        .map_err(anyhow::Error::from)??;

        if chunks.is_empty() {
            tracing::warn!("No text found under {}", self.docs_path.display());
        }

        // 2. Fingerprint
        let fingerprint = corpus_fingerprint(self.embedder.model(), &chunk_config, &chunks);

        // 3. Dense index, reused when the persisted one matches this corpus
        let dense = self.load_or_embed(&fingerprint, &chunks).await?;

        // 4. Sparse index, always rebuilt from the same chunks
        let (sparse, chunks) = tokio::task::spawn_blocking(move || {
            let index = Bm25Index::build(&chunks)?;
            Ok::<_, anyhow::Error>((index, chunks))
        })
        .await
        .map_err(anyhow::Error::from)??;

        tracing::info!(
            "Index snapshot {} built: {} chunks in {:.1}s",
            &fingerprint[..12],
            chunks.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(IndexSnapshot {
            chunks,
            dense,
            sparse,
            fingerprint,
            built_at: Utc::now(),
        })
    }

    async fn load_or_embed(
        &self,
        fingerprint: &str,
        chunks: &[DocumentChunk],
    ) -> Result<VectorStore, RetrievalError> {
        let dir = self.vector_store_path.clone();
        let persisted = tokio::task::spawn_blocking(move || VectorStore::load(&dir))
            .await
            .map_err(anyhow::Error::from)??;

        if let Some(store) = persisted {
            let manifest = store.manifest();
            if manifest.fingerprint == fingerprint && manifest.chunk_count == chunks.len() {
                tracing::info!("Reusing persisted dense index ({} vectors)", store.len());
                return Ok(store);
            }
            tracing::info!("Persisted dense index is stale, re-embedding corpus");
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let store = VectorStore::new(fingerprint.to_string(), self.embedder.model(), embeddings);
        let dir = self.vector_store_path.clone();
        let store = tokio::task::spawn_blocking(move || {
            store.save(&dir)?;
            Ok::<_, anyhow::Error>(store)
        })
        .await
        .map_err(anyhow::Error::from)??;

        Ok(store)
    }
}

/// SHA-256 over the embedding model, chunking parameters and every chunk.
pub fn corpus_fingerprint(
    embedding_model: &str,
    chunk_config: &ChunkConfig,
    chunks: &[DocumentChunk],
) -> String {
    let mut hasher = Sha256::new();
    // Length prefixes keep field boundaries unambiguous
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };

    field(embedding_model.as_bytes());
    field(&(chunk_config.chunk_size as u64).to_le_bytes());
    field(&(chunk_config.chunk_overlap as u64).to_le_bytes());
    for chunk in chunks {
        field(chunk.source.as_bytes());
        field(&(chunk.page as u64).to_le_bytes());
        field(chunk.content.as_bytes());
    }

    hex::encode(hasher.finalize())
}
