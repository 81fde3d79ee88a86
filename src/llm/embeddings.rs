use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, LlmProvider};
use crate::llm::{send_json, ProviderError, Service};

/// Maximum characters sent per text to the embedding API.
/// Chunks are bounded by the chunk size already; this only guards against a
/// misconfigured chunk size blowing past the model's context window.
const MAX_EMBED_CHARS: usize = 3_000;

/// Keep at most `MAX_EMBED_CHARS` chars of `text`.
fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier; part of the corpus fingerprint.
    fn model(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode {
                service: Service::Embedding,
                message: "no embedding returned".to_string(),
            })
    }
}

/// Embedder backed by Ollama or an OpenAI-compatible API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.config.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        let embeddings = match self.config.provider {
            LlmProvider::Ollama => embed_ollama(&self.client, &self.config, &truncated).await?,
            LlmProvider::OpenAi => embed_openai(&self.client, &self.config, &truncated).await?,
        };

        if embeddings.len() != texts.len() {
            return Err(ProviderError::Decode {
                service: Service::Embedding,
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    embeddings.len()
                ),
            });
        }
        Ok(embeddings)
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));

    let batch_size = 32;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OllamaEmbedRequest {
            model: &config.embedding_model,
            input: chunk,
            truncate: true,
        };

        let body: OllamaEmbedResponse =
            send_json(client.post(&url), Service::Embedding, &req).await?;
        all_embeddings.extend(body.embeddings);
    }

    Ok(all_embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let batch_size = 64;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OpenAiEmbedRequest {
            model: &config.embedding_model,
            input: chunk,
        };

        let request = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"));
        let body: OpenAiEmbedResponse = send_json(request, Service::Embedding, &req).await?;
        all_embeddings.extend(body.data.into_iter().map(|d| d.embedding));
    }

    Ok(all_embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_for_embedding("préavis"), "préavis");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        // Two bytes per char: a byte limit would keep only half
        let text = "ع".repeat(MAX_EMBED_CHARS + 10);
        let out = truncate_for_embedding(&text);
        assert_eq!(out.chars().count(), MAX_EMBED_CHARS);
        assert!(out.chars().all(|c| c == 'ع'));

        let exact = "é".repeat(MAX_EMBED_CHARS);
        assert_eq!(truncate_for_embedding(&exact), exact);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..LlmConfig::default()
        };
        let embedder = HttpEmbedder::new(reqwest::Client::new(), config);
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.model(), "nomic-embed-text");
    }
}
