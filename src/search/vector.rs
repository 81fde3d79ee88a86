use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Describes which corpus a persisted dense index was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Corpus fingerprint (chunk set + chunking + embedding model)
    pub fingerprint: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    chunk_id: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    manifest: IndexManifest,
    entries: Vec<VectorEntry>,
}

/// In-memory dense index with disk persistence and cosine similarity search.
pub struct VectorStore {
    manifest: IndexManifest,
    entries: Vec<VectorEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: usize,
    pub score: f32,
}

impl VectorStore {
    pub const FILE_NAME: &'static str = "index.json";

    /// Build from embeddings parallel with chunk ids `0..embeddings.len()`.
    pub fn new(fingerprint: String, embedding_model: &str, embeddings: Vec<Vec<f32>>) -> Self {
        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        let manifest = IndexManifest {
            fingerprint,
            embedding_model: embedding_model.to_string(),
            dimensions,
            chunk_count: embeddings.len(),
            created_at: Utc::now(),
        };
        let entries = embeddings
            .into_iter()
            .enumerate()
            .map(|(chunk_id, embedding)| VectorEntry {
                chunk_id,
                embedding,
            })
            .collect();
        Self { manifest, entries }
    }

    /// Load the index persisted in `dir`. Returns `None` when there is no
    /// index yet or the file is unreadable as an index.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let data = std::fs::read_to_string(&path).context("Failed to read vector store")?;
        match serde_json::from_str::<PersistedIndex>(&data) {
            Ok(persisted) => Ok(Some(Self {
                manifest: persisted.manifest,
                entries: persisted.entries,
            })),
            Err(e) => {
                tracing::warn!("Ignoring corrupt vector store at {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Persist to `dir` (atomic write via temp file + rename).
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let persisted = PersistedIndex {
            manifest: self.manifest.clone(),
            entries: self.entries.clone(),
        };
        let data = serde_json::to_string(&persisted)?;

        let path = dir.join(Self::FILE_NAME);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write vector store")?;
        std::fs::rename(&tmp_path, &path).context("Failed to move vector store into place")?;
        Ok(())
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Search by cosine similarity; ties are broken by chunk id.
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<VectorHit> {
        let mut scored: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|e| VectorHit {
                chunk_id: e.chunk_id,
                score: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(limit);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VectorStore {
        VectorStore::new(
            "abc".into(),
            "test-embed",
            vec![
                vec![0.1, 0.2, 0.9], // procedure
                vec![0.9, 0.1, 0.1], // tenancy
                vec![0.2, 0.8, 0.3], // family
            ],
        )
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_or_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let hits = store().search(&[0.95, 0.05, 0.05], 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk_id, 1);
    }

    #[test]
    fn test_ties_broken_by_chunk_id() {
        let store = VectorStore::new("x".into(), "m", vec![vec![1.0, 0.0]; 4]);
        let ids: Vec<usize> = store.search(&[1.0, 0.0], 4).iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let original = store();
        original.save(dir.path()).unwrap();

        let loaded = VectorStore::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.manifest(), original.manifest());
        assert_eq!(loaded.manifest().dimensions, 3);
        assert_eq!(
            loaded.search(&[0.2, 0.8, 0.3], 1),
            original.search(&[0.2, 0.8, 0.3], 1)
        );
        assert!(!dir.path().join("index.json.tmp").exists());
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VectorStore::load(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(VectorStore::FILE_NAME), "{not json").unwrap();
        assert!(VectorStore::load(dir.path()).unwrap().is_none());
    }
}
