use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use flare_rag::{
    GenerationClient, GenerationConfig, OllamaEmbeddingProvider, OpenAiCompatGenerator,
    QdrantVectorStore, RagPipeline,
};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    routes::{AppState, app_router},
};

/// Wire the Ollama embedder, the Qdrant store and, when `LLM_BASE_URL` is
/// set, the generation client into a pipeline.
///
/// A generation backend that fails to load is kept uninitialized so the
/// retrieval routes stay available; `/query` then answers 503.
pub async fn build_pipeline(config: &ServerConfig) -> anyhow::Result<RagPipeline> {
    let embedder = OllamaEmbeddingProvider::new(config.ollama_base_url.clone())?
        .with_model(config.embedding_model.clone());
    let store = QdrantVectorStore::connect(&config.qdrant_url, config.qdrant_api_key.clone())
        .with_context(|| format!("failed to connect to Qdrant at {}", config.qdrant_url))?;

    let mut builder = RagPipeline::builder()
        .config(config.rag_config()?)
        .embedding_provider(Arc::new(embedder))
        .vector_store(Arc::new(store));

    if let Some(base_url) = &config.llm_base_url {
        let generator = OpenAiCompatGenerator::new(
            base_url.clone(),
            config.llm_base_model.clone(),
            config.llm_adapter_dir.clone(),
        )?;
        let client = GenerationClient::new(Arc::new(generator), GenerationConfig::default());
        if let Err(e) = client.initialize().await {
            warn!(error = %e, "generation backend unavailable, /query disabled");
        }
        builder = builder.generation(Arc::new(client));
    } else {
        info!("LLM_BASE_URL not set, /query disabled");
    }

    Ok(builder.build()?)
}

/// Build the pipeline, serve until ctrl-c, then release backend connections.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for flare-server")?;

    let pipeline = Arc::new(build_pipeline(&config).await?);
    let app = app_router(AppState::new(pipeline.clone()), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("flare-server listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    pipeline.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
