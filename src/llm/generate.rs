use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::{LlmConfig, LlmProvider};
use crate::llm::prompt::Language;
use crate::llm::{send_json, ProviderError, Service};

/// A hosted language model that completes a single prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Chat model backed by Ollama or an OpenAI-compatible API.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatModel {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn model(&self) -> &str {
        &self.config.chat_model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let text = match self.config.provider {
            LlmProvider::Ollama => call_ollama(&self.client, &self.config, prompt).await?,
            LlmProvider::OpenAi => call_openai(&self.client, &self.config, prompt).await?,
        };

        if text.trim().is_empty() {
            return Err(ProviderError::Decode {
                service: Service::Generation,
                message: "empty completion".to_string(),
            });
        }
        Ok(text)
    }
}

/// A generated answer and how long the model took to produce it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub elapsed: Duration,
}

/// Render the language's template and ask the model, retrying transient
/// failures up to `max_retries` times with a growing pause.
pub async fn generate_answer(
    model: &dyn ChatModel,
    language: Language,
    context: &str,
    chat_history: &str,
    question: &str,
    max_retries: u32,
) -> Result<Answer, ProviderError> {
    let prompt = language.template().render(context, chat_history, question);
    let start = Instant::now();

    let mut attempt = 0;
    loop {
        match model.complete(&prompt).await {
            Ok(text) => {
                return Ok(Answer {
                    text: text.trim().to_string(),
                    elapsed: start.elapsed(),
                })
            }
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Generation with {} failed (attempt {attempt}/{}): {e}",
                    model.model(),
                    max_retries + 1
                );
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

async fn call_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String, ProviderError> {
    let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));

    let req = OllamaChatRequest {
        model: &config.chat_model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        stream: false,
    };

    let body: OllamaChatResponse = send_json(client.post(&url), Service::Generation, &req).await?;
    Ok(body.message.content.unwrap_or_default())
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ResponseMessage,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String, ProviderError> {
    let url = format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/'));
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiChatRequest {
        model: &config.chat_model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature: 0.0,
    };

    let request = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"));
    let body: OpenAiChatResponse = send_json(request, Service::Generation, &req).await?;
    Ok(body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}
