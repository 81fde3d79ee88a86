//! Cross-encoder scoring via an OpenAI-compatible `/v1/rerank` endpoint.
//!
//! All query-passage pairs go out in a single batch request.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::llm::{send_json, ProviderError, Service};

/// Score of a single passage.
#[derive(Debug, Clone)]
pub struct RerankResult {
    /// Index into the submitted documents.
    pub index: usize,
    /// Relevance in 0.0 - 1.0 after sigmoid normalization.
    pub score: f32,
}

/// Score `documents` against `query` with the cross-encoder `model`.
///
/// Results come back sorted by score descending, ties by index.
pub async fn score(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    timeout: Duration,
    query: &str,
    documents: &[String],
) -> Result<Vec<RerankResult>, ProviderError> {
    let url = format!("{}/v1/rerank", base_url.trim_end_matches('/'));

    let req_body = RerankRequest {
        model,
        query,
        documents,
        top_n: documents.len(),
    };

    let body: RerankResponse =
        send_json(client.post(&url).timeout(timeout), Service::Rerank, &req_body).await?;

    let mut results = Vec::with_capacity(body.results.len());
    for r in body.results {
        if r.index >= documents.len() {
            return Err(ProviderError::Decode {
                service: Service::Rerank,
                message: format!("result index {} out of range", r.index),
            });
        }
        results.push(RerankResult {
            index: r.index,
            score: sigmoid(r.relevance_score),
        });
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });

    Ok(results)
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}
