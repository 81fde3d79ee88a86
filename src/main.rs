use tracing_subscriber::EnvFilter;

use legal_assistant::api;
use legal_assistant::config::Config;
use legal_assistant::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Documents: {}", config.docs_path.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    if let Some(tier) = config.reranker.default_tier {
        tracing::info!("Default rerank tier: {tier} ({})", tier.model_name());
    }

    let bind_addr = config.bind_addr.clone();
    let warm_index = config.warm_index;
    let state = AppState::new(config)?;

    if warm_index {
        let retrieval = state.retrieval.clone();
        tokio::spawn(async move {
            if let Err(e) = retrieval.ensure_loaded().await {
                tracing::error!("Index warm-up failed: {e}");
            }
        });
    }

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
