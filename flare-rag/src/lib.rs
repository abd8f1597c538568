//! # flare-rag
//!
//! Retrieval-augmented generation pipeline: chunking, embedding, filtered
//! vector search and cached, retried text generation.
//!
//! ## Overview
//!
//! - [`BoundaryChunker`] - sentence-aware overlapping text splitter
//! - [`EmbeddingProvider`] - embedding seam; [`OllamaEmbeddingProvider`] with `ollama`
//! - [`VectorStore`] - collection management and filtered search;
//!   [`InMemoryVectorStore`] always, [`QdrantVectorStore`] with `qdrant`
//! - [`GenerationClient`] - retries and LRU memoization over a [`TextGenerator`];
//!   [`OpenAiCompatGenerator`] with `openai-compat`
//! - [`RagPipeline`] - ingestion and query orchestration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flare_rag::{InMemoryVectorStore, Payload, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OllamaEmbeddingProvider::from_env()?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.create_collection("docs", None, None).await?;
//! pipeline.ingest_text("docs", "Rust is a systems language.", &Payload::new()).await?;
//! let hits = pipeline.search("docs", "systems language", pipeline.search_options()).await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `ollama` | Ollama `/api/embed` embedding provider |
//! | `openai-compat` | OpenAI-compatible completions generator with LoRA loading |
//! | `qdrant` | Qdrant vector store |
//! | `pdf` | PDF text extraction |
//! | `docx` | DOCX text extraction |
//! | `full` | All of the above |

pub mod cache;
pub mod checkpoint;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod filter;
pub mod generation;
pub mod inmemory;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai-compat")]
pub mod openai_compat;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod retry;
pub mod vectorstore;

pub use cache::{CacheStats, ResponseCache};
pub use checkpoint::find_latest_checkpoint;
pub use chunking::{BoundaryChunker, Chunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, DocumentFormat, Payload, Point, SearchResult};
pub use embedding::{EmbeddingProvider, cosine_similarity};
pub use error::{RagError, Result};
pub use extract::{ExtractedText, extract_text};
pub use filter::{Combinator, ConditionSpec, FieldCondition, Filter, MatchValue, Range};
pub use generation::{GenerationClient, GenerationConfig, SamplingParams, TextGenerator};
pub use inmemory::InMemoryVectorStore;
#[cfg(feature = "ollama")]
pub use ollama::OllamaEmbeddingProvider;
#[cfg(feature = "openai-compat")]
pub use openai_compat::OpenAiCompatGenerator;
pub use pipeline::{IngestReport, QueryResponse, RagPipeline, RagPipelineBuilder, SearchOptions};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use retry::RetryPolicy;
pub use vectorstore::{
    CollectionAction, CollectionConfig, CollectionInfo, CollectionUpdate, Distance, ManageOutcome,
    SearchRequest, VectorStore,
};
