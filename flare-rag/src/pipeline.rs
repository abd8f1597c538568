//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest and query workflows by
//! composing an [`EmbeddingProvider`], a [`VectorStore`], a [`Chunker`],
//! and an optional [`GenerationClient`]. Every upstream call (embed, upsert,
//! search) runs under the pipeline's [`RetryPolicy`].
//!
//! # Example
//!
//! ```rust,ignore
//! use flare_rag::{RagPipeline, RagConfig, InMemoryVectorStore};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generation(Arc::new(generation_client))
//!     .build()?;
//!
//! pipeline.create_collection("docs", None, None).await?;
//! pipeline.ingest_text("docs", "Some long text...", &Payload::new()).await?;
//! let options = pipeline.search_options();
//! let response = pipeline.query("docs", "Answer briefly", "what is it?", options).await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunking::{BoundaryChunker, Chunker};
use crate::config::RagConfig;
use crate::document::{Document, Payload, Point, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extract::extract_text;
use crate::filter::Filter;
use crate::generation::GenerationClient;
use crate::retry::RetryPolicy;
use crate::vectorstore::{
    CollectionAction, CollectionConfig, CollectionInfo, CollectionUpdate, Distance,
    ManageOutcome, SearchRequest, VectorStore,
};

/// Per-request search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub limit: usize,
    /// Minimum score; `None` keeps every result.
    pub score_threshold: Option<f32>,
    /// Optional payload filter.
    pub filter: Option<Filter>,
}

impl SearchOptions {
    /// Options with the given limit and no threshold or filter.
    pub fn new(limit: usize) -> Self {
        Self { limit, score_threshold: None, filter: None }
    }

    /// Set the minimum score.
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Set the payload filter.
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }
}

/// Outcome of ingesting a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Ids of the stored points, in chunk order.
    pub point_ids: Vec<String>,
    /// The text encoding that was detected or declared, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// A generated answer together with the retrieved context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// The generated answer.
    pub answer: String,
    /// Search results, ordered by descending score.
    pub context: Vec<SearchResult>,
}

/// Merge payload maps left to right; later keys overwrite earlier ones.
pub fn merge_payloads<'a>(payloads: impl IntoIterator<Item = &'a Payload>) -> Payload {
    let mut merged = Payload::new();
    for payload in payloads {
        merged.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// The retrieval pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. All collaborators are
/// shared handles, so a pipeline can serve concurrent requests.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    generation: Option<Arc<GenerationClient>>,
    retry: RetryPolicy,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return the generation client, if one is configured.
    pub fn generation(&self) -> Option<&Arc<GenerationClient>> {
        self.generation.as_ref()
    }

    /// Search options populated from the configured defaults.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions::new(self.config.search_limit)
            .with_score_threshold(self.config.score_threshold)
    }

    /// Create a collection, falling back to the configured vector size and
    /// distance. Creating an existing collection is a no-op.
    pub async fn create_collection(
        &self,
        name: &str,
        vector_size: Option<usize>,
        distance: Option<Distance>,
    ) -> Result<()> {
        let config = CollectionConfig::new(
            vector_size.unwrap_or(self.config.vector_size),
            distance.unwrap_or(self.config.distance),
        );
        self.vector_store.create_collection(name, config).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
        })
    }

    /// Delete a collection and all of its points.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store.delete_collection(name).await
    }

    /// Change mutable collection settings.
    pub async fn update_collection(&self, name: &str, update: CollectionUpdate) -> Result<()> {
        self.vector_store.update_collection(name, update).await
    }

    /// Describe a collection.
    pub async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        self.vector_store.collection_info(name).await
    }

    /// Names of all collections.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.vector_store.list_collections().await
    }

    /// Dispatch a management action to the vector store.
    pub async fn manage(&self, name: &str, action: CollectionAction) -> Result<ManageOutcome> {
        self.vector_store.manage(name, action).await
    }

    /// Cosine similarity between the embeddings of two texts.
    pub async fn text_similarity(&self, a: &str, b: &str) -> Result<f32> {
        self.embedding_provider.text_similarity(a, b).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.retry.run("embed", || self.embedding_provider.embed(text)).await
    }

    /// Embed one piece of text and store it as a single point.
    ///
    /// The text is merged into `payload` under the configured text key,
    /// overwriting any caller value there. Returns the new point id.
    ///
    /// # Errors
    ///
    /// Input errors (empty text, dimension mismatch) are returned as-is;
    /// upstream failures surface as [`RagError::RetriesExhausted`].
    pub async fn ingest_chunk(
        &self,
        collection: &str,
        text: &str,
        payload: &Payload,
    ) -> Result<String> {
        let vector = self.embed(text).await?;
        let mut payload = payload.clone();
        payload.insert(self.config.text_key.clone(), Value::String(text.to_string()));

        let point = Point::new(Uuid::new_v4().to_string(), vector, payload);
        let points = std::slice::from_ref(&point);
        self.retry.run("upsert", || self.vector_store.upsert(collection, points)).await?;
        Ok(point.id)
    }

    /// Chunk `text` and ingest every chunk as its own point.
    ///
    /// Chunks are stored one by one. A failure stops ingestion and is
    /// returned, but points stored before it are kept.
    pub async fn ingest_text(
        &self,
        collection: &str,
        text: &str,
        payload: &Payload,
    ) -> Result<Vec<String>> {
        let chunks = self.chunker.split(text);
        let mut ids = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            match self.ingest_chunk(collection, &chunk.text, payload).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    error!(
                        collection,
                        chunk = index,
                        stored = ids.len(),
                        error = %e,
                        "ingestion failed"
                    );
                    return Err(e);
                }
            }
        }
        info!(collection, chunk_count = ids.len(), "ingested text");
        Ok(ids)
    }

    /// Extract, chunk and ingest a document.
    pub async fn ingest_document(
        &self,
        collection: &str,
        document: &Document,
        payload: &Payload,
    ) -> Result<IngestReport> {
        let extracted = extract_text(document)?;
        if extracted.text.trim().is_empty() {
            warn!(collection, format = %document.format, "document contains no text");
        }
        let point_ids = self.ingest_text(collection, &extracted.text, payload).await?;
        Ok(IngestReport { point_ids, encoding: extracted.encoding })
    }

    /// Embed `query` once and run a single filtered search.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let vector = self.embed(query).await?;
        self.search_vector(collection, vector, options).await
    }

    /// Run a filtered search with a precomputed query vector.
    pub async fn search_vector(
        &self,
        collection: &str,
        vector: Vec<f32>,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let request = SearchRequest::new(vector, options.limit)
            .with_score_threshold(options.score_threshold)
            .with_filter(options.filter);
        let results = self
            .retry
            .run("search", || self.vector_store.search(collection, request.clone()))
            .await?;
        info!(collection, result_count = results.len(), "search completed");
        Ok(results)
    }

    /// Retrieve context for `query`, then generate an answer for
    /// `(instruction, query)`.
    ///
    /// When `include_context` is enabled, the retrieved chunk texts are
    /// appended to the generation input under a `Context:` heading.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] if no generation client is
    /// configured or it has not been initialized.
    pub async fn query(
        &self,
        collection: &str,
        instruction: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<QueryResponse> {
        let generation = self
            .generation
            .as_ref()
            .ok_or_else(|| RagError::NotInitialized("generation client".to_string()))?;

        let context = self.search(collection, query, options).await?;
        let input = if self.config.include_context {
            self.with_context(query, &context)
        } else {
            query.to_string()
        };

        let answer = generation.generate(instruction, &input).await?;
        Ok(QueryResponse { answer, context })
    }

    fn with_context(&self, query: &str, context: &[SearchResult]) -> String {
        let texts: Vec<&str> =
            context.iter().filter_map(|r| r.text(&self.config.text_key)).collect();
        if texts.is_empty() {
            return query.to_string();
        }
        format!("{query}\n\nContext:\n{}", texts.join("\n\n"))
    }

    /// Release the vector store connection and unload the generator.
    pub async fn shutdown(&self) -> Result<()> {
        self.vector_store.shutdown().await?;
        if let Some(generation) = &self.generation {
            generation.shutdown().await?;
        }
        info!("pipeline shut down");
        Ok(())
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider and vector store are required. Without a
/// config the defaults are used; without a chunker a [`BoundaryChunker`]
/// is built from the config.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generation: Option<Arc<GenerationClient>>,
    retry: Option<RetryPolicy>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the text chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the generation client used by [`RagPipeline::query`].
    pub fn generation(mut self, client: Arc<GenerationClient>) -> Self {
        self.generation = Some(client);
        self
    }

    /// Set the retry policy for embed, upsert and search calls.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the default chunker cannot be built from the config.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(BoundaryChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            generation: self.generation,
            retry: self.retry.unwrap_or_default(),
        })
    }
}
