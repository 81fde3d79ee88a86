use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ConfigError, RerankerConfig};
use crate::llm::cross_encoder;
use crate::llm::{ProviderError, Service};
use crate::models::SearchHit;

/// Reranking model size. Nano runs in-process; the others use the
/// cross-encoder sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RerankTier {
    Nano,
    Small,
    Medium,
    Large,
}

impl RerankTier {
    pub const ALL: [RerankTier; 4] = [
        RerankTier::Nano,
        RerankTier::Small,
        RerankTier::Medium,
        RerankTier::Large,
    ];

    /// Model the tier stands for. Small, Medium and Large send it to the
    /// sidecar and use it as their cache directory name. Nano's entry only
    /// names the model its lexical scorer stands in for, in startup logs.
    pub fn model_name(&self) -> &'static str {
        match self {
            RerankTier::Nano => "ms-marco-TinyBERT-L-2-v2",
            RerankTier::Small => "ms-marco-MiniLM-L-12-v2",
            RerankTier::Medium => "rank-T5-flan",
            RerankTier::Large => "ms-marco-MultiBERT-L-12",
        }
    }
}

impl std::str::FromStr for RerankTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Nano" => Ok(RerankTier::Nano),
            "Small" => Ok(RerankTier::Small),
            "Medium" => Ok(RerankTier::Medium),
            "Large" => Ok(RerankTier::Large),
            other => Err(ConfigError::UnknownRerankTier(other.to_string())),
        }
    }
}

impl std::fmt::Display for RerankTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RerankTier::Nano => "Nano",
            RerankTier::Small => "Small",
            RerankTier::Medium => "Medium",
            RerankTier::Large => "Large",
        };
        f.write_str(name)
    }
}

#[derive(Serialize)]
struct ModelManifest<'a> {
    tier: RerankTier,
    model: &'a str,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Second-pass relevance scoring of retrieved passages.
pub struct Reranker {
    client: reqwest::Client,
    config: RerankerConfig,
    /// Tiers whose model directory exists
    prepared: Mutex<HashSet<RerankTier>>,
}

impl Reranker {
    pub fn new(client: reqwest::Client, config: RerankerConfig) -> Self {
        Self {
            client,
            config,
            prepared: Mutex::new(HashSet::new()),
        }
    }

    /// Reorder `hits` by relevance to `query`, setting `rerank_score`.
    pub async fn rerank(
        &self,
        query: &str,
        mut hits: Vec<SearchHit>,
        tier: RerankTier,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        if hits.is_empty() {
            return Ok(hits);
        }

        if tier == RerankTier::Nano {
            for hit in hits.iter_mut() {
                hit.rerank_score = Some(lexical_score(query, &hit.content));
            }
            // Stable: equal scores keep their fused order
            hits.sort_by(|a, b| {
                b.rerank_score
                    .partial_cmp(&a.rerank_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            return Ok(hits);
        }

        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| ProviderError::Config {
                service: Service::Rerank,
                message: format!("RERANKER_BASE_URL is required for the {tier} tier"),
            })?;

        self.prepare_model_dir(tier)?;

        let documents: Vec<String> = hits.iter().map(|h| h.content.clone()).collect();
        let timeout = Duration::from_secs(self.config.timeout_secs.min(30));
        let results = cross_encoder::score(
            &self.client,
            base_url,
            tier.model_name(),
            timeout,
            query,
            &documents,
        )
        .await?;

        tracing::debug!("Reranked {} passages with {}", hits.len(), tier.model_name());
        Ok(apply_order(hits, &results))
    }

    fn model_dir(&self, tier: RerankTier) -> PathBuf {
        self.config.cache_dir.join(tier.model_name())
    }

    /// Create `<cache_dir>/<model>/model.json` the first time a tier is used.
    /// The sidecar loads models from this directory; nothing in this process
    /// reads the manifest back.
    fn prepare_model_dir(&self, tier: RerankTier) -> Result<(), ProviderError> {
        let mut prepared = self.prepared.lock();
        if prepared.contains(&tier) {
            return Ok(());
        }

        let dir = self.model_dir(tier);
        let manifest_path = dir.join("model.json");
        if !manifest_path.exists() {
            let io_err = |e: std::io::Error| ProviderError::Config {
                service: Service::Rerank,
                message: format!("cannot prepare {}: {e}", dir.display()),
            };
            std::fs::create_dir_all(&dir).map_err(io_err)?;
            let manifest = ModelManifest {
                tier,
                model: tier.model_name(),
                created_at: chrono::Utc::now(),
            };
            let data = serde_json::to_string_pretty(&manifest).map_err(|e| {
                ProviderError::Config {
                    service: Service::Rerank,
                    message: e.to_string(),
                }
            })?;
            std::fs::write(&manifest_path, data).map_err(io_err)?;
            tracing::info!("Prepared reranker model directory {}", dir.display());
        }

        prepared.insert(tier);
        Ok(())
    }
}

/// Put hits in the order of `results`; any hit the sidecar left out keeps
/// its relative position after the scored ones.
fn apply_order(hits: Vec<SearchHit>, results: &[cross_encoder::RerankResult]) -> Vec<SearchHit> {
    let mut slots: Vec<Option<SearchHit>> = hits.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());

    for r in results {
        if let Some(mut hit) = slots.get_mut(r.index).and_then(Option::take) {
            hit.rerank_score = Some(r.score);
            ordered.push(hit);
        }
    }
    ordered.extend(slots.into_iter().flatten());
    ordered
}

/// Fraction of distinct query terms present in the passage, with a small
/// bonus for repeated matches.
fn lexical_score(query: &str, passage: &str) -> f32 {
    let query_terms: HashSet<String> = tokenize(query).collect();
    if query_terms.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for term in tokenize(passage) {
        *counts.entry(term).or_default() += 1;
    }

    let mut matched = 0usize;
    let mut extra = 0usize;
    for term in &query_terms {
        if let Some(&n) = counts.get(term) {
            matched += 1;
            extra += n - 1;
        }
    }

    let coverage = matched as f32 / query_terms.len() as f32;
    let repetition = extra as f32 / (extra as f32 + 10.0);
    0.9 * coverage + 0.1 * repetition
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
}
