//! Clients for the hosted models: embeddings, answer generation and reranking.

pub mod cross_encoder;
pub mod embeddings;
pub mod generate;
pub mod prompt;
pub mod rerank;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Which external model a failed call was made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    Generation,
    Rerank,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Embedding => f.write_str("embedding"),
            Service::Generation => f.write_str("generation"),
            Service::Rerank => f.write_str("rerank"),
        }
    }
}

/// Failure of a call to a model provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{service} provider unreachable: {source}")]
    Transport {
        service: Service,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} provider returned {status}: {body}")]
    Status {
        service: Service,
        status: u16,
        body: String,
    },
    #[error("{service} provider sent an unusable response: {message}")]
    Decode { service: Service, message: String },
    #[error("{service} provider misconfigured: {message}")]
    Config { service: Service, message: String },
}

impl ProviderError {
    pub fn service(&self) -> Service {
        match self {
            ProviderError::Transport { service, .. }
            | ProviderError::Status { service, .. }
            | ProviderError::Decode { service, .. }
            | ProviderError::Config { service, .. } => *service,
        }
    }

    /// Worth retrying: connection failures, rate limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport { .. } => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Decode { .. } | ProviderError::Config { .. } => false,
        }
    }
}

/// POST `body` as JSON and decode a JSON reply, mapping each failure to a
/// `ProviderError` for `service`.
pub(crate) async fn send_json<B, R>(
    request: reqwest::RequestBuilder,
    service: Service,
    body: &B,
) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let resp = request
        .json(body)
        .send()
        .await
        .map_err(|source| ProviderError::Transport { service, source })?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            service,
            status,
            body,
        });
    }

    resp.json().await.map_err(|e| ProviderError::Decode {
        service,
        message: e.to_string(),
    })
}
