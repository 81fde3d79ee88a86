use std::collections::HashMap;

use crate::config::RetrievalConfig;
use crate::models::{DocumentChunk, SearchHit};
use crate::search::bm25::Bm25Hit;
use crate::search::vector::VectorHit;

/// RRF constant
const RRF_K: f32 = 60.0;

/// Ranked lists from both indexes for one query.
pub struct QueryResults {
    pub bm25_hits: Vec<Bm25Hit>,
    pub vector_hits: Vec<VectorHit>,
}

/// Relative weight of each index in the fused score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub dense: f32,
    pub sparse: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            dense: 0.4,
            sparse: 0.6,
        }
    }
}

impl From<&RetrievalConfig> for FusionWeights {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            dense: config.dense_weight,
            sparse: config.sparse_weight,
        }
    }
}

/// Weighted Reciprocal Rank Fusion of the dense and sparse rankings.
///
/// Each list contributes `weight / (k + rank)` (1-based rank, k = 60) to every
/// chunk it contains; contributions are summed per chunk. Raw BM25 and cosine
/// scores live on different scales, so only ranks are combined. Results are
/// sorted by fused score, ties by chunk id, so the output is a pure function
/// of the two input lists.
pub fn weighted_rrf_fusion(
    results: &QueryResults,
    weights: FusionWeights,
    chunks: &[DocumentChunk],
    limit: usize,
) -> Vec<SearchHit> {
    let mut score_map: HashMap<usize, SearchHit> = HashMap::new();

    let new_hit = |chunk: &DocumentChunk| SearchHit {
        chunk_id: chunk.id,
        source: chunk.source.clone(),
        page: chunk.page,
        content: chunk.content.clone(),
        dense_score: 0.0,
        sparse_score: 0.0,
        combined_score: 0.0,
        rerank_score: None,
    };

    for (rank, hit) in results.vector_hits.iter().enumerate() {
        let Some(chunk) = chunks.get(hit.chunk_id) else {
            continue;
        };
        let rrf_score = weights.dense / (RRF_K + rank as f32 + 1.0);
        let entry = score_map
            .entry(hit.chunk_id)
            .or_insert_with(|| new_hit(chunk));
        entry.dense_score = entry.dense_score.max(hit.score);
        entry.combined_score += rrf_score;
    }

    for (rank, hit) in results.bm25_hits.iter().enumerate() {
        let Some(chunk) = chunks.get(hit.chunk_id) else {
            continue;
        };
        let rrf_score = weights.sparse / (RRF_K + rank as f32 + 1.0);
        let entry = score_map
            .entry(hit.chunk_id)
            .or_insert_with(|| new_hit(chunk));
        entry.sparse_score = entry.sparse_score.max(hit.score);
        entry.combined_score += rrf_score;
    }

    let mut fused: Vec<SearchHit> = score_map.into_values().collect();
    fused.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize) -> Vec<DocumentChunk> {
        (0..n)
            .map(|id| DocumentChunk {
                id,
                source: "code_du_travail.pdf".into(),
                page: id + 1,
                content: format!("article {id}"),
            })
            .collect()
    }

    fn bm25(ids: &[usize]) -> Vec<Bm25Hit> {
        ids.iter()
            .enumerate()
            .map(|(i, &chunk_id)| Bm25Hit {
                chunk_id,
                score: 10.0 - i as f32,
            })
            .collect()
    }

    fn dense(ids: &[usize]) -> Vec<VectorHit> {
        ids.iter()
            .enumerate()
            .map(|(i, &chunk_id)| VectorHit {
                chunk_id,
                score: 0.9 - i as f32 * 0.1,
            })
            .collect()
    }

    #[test]
    fn test_empty_inputs() {
        let qr = QueryResults {
            bm25_hits: vec![],
            vector_hits: vec![],
        };
        assert!(weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(3), 10).is_empty());
    }

    #[test]
    fn test_sparse_only() {
        let qr = QueryResults {
            bm25_hits: bm25(&[2, 0]),
            vector_hits: vec![],
        };
        let results = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(3), 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, 2);
        assert_eq!(results[0].content, "article 2");
        assert_eq!(results[0].page, 3);
        let expected = 0.6 / (RRF_K + 1.0);
        assert!((results[0].combined_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_weight_beats_dense_at_same_rank() {
        let qr = QueryResults {
            bm25_hits: bm25(&[1]),
            vector_hits: dense(&[0]),
        };
        let results = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(2), 10);
        assert_eq!(results[0].chunk_id, 1);
        assert_eq!(results[1].chunk_id, 0);
    }

    #[test]
    fn test_chunk_in_both_lists_is_boosted() {
        let qr = QueryResults {
            bm25_hits: bm25(&[0, 1, 2]),
            vector_hits: dense(&[3, 1]),
        };
        let results = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(4), 10);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].chunk_id, 1);
        assert!(results[0].dense_score > 0.0);
        assert!(results[0].sparse_score > 0.0);
        let expected = 0.6 / (RRF_K + 2.0) + 0.4 / (RRF_K + 2.0);
        assert!((results[0].combined_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_ties_broken_by_chunk_id() {
        let weights = FusionWeights {
            dense: 0.5,
            sparse: 0.5,
        };
        let qr = QueryResults {
            bm25_hits: bm25(&[4]),
            vector_hits: dense(&[2]),
        };
        let results = weighted_rrf_fusion(&qr, weights, &corpus(5), 10);
        assert_eq!(results[0].chunk_id, 2);
        assert_eq!(results[1].chunk_id, 4);
    }

    #[test]
    fn test_limit_respected() {
        let ids: Vec<usize> = (0..50).collect();
        let qr = QueryResults {
            bm25_hits: bm25(&ids),
            vector_hits: vec![],
        };
        let results = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(50), 5);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_unknown_chunk_ids_are_skipped() {
        let qr = QueryResults {
            bm25_hits: bm25(&[0, 99]),
            vector_hits: dense(&[42]),
        };
        let results = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(1), 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, 0);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let qr = QueryResults {
            bm25_hits: bm25(&[5, 3, 1, 7]),
            vector_hits: dense(&[1, 6, 5, 2]),
        };
        let first = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(8), 8);
        for _ in 0..10 {
            let again = weighted_rrf_fusion(&qr, FusionWeights::default(), &corpus(8), 8);
            let a: Vec<usize> = first.iter().map(|h| h.chunk_id).collect();
            let b: Vec<usize> = again.iter().map(|h| h.chunk_id).collect();
            assert_eq!(a, b);
        }
    }
}
