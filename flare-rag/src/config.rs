//! Configuration for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::vectorstore::Distance;

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Default number of results returned by a search.
    pub search_limit: usize,
    /// Default minimum similarity score; `None` disables the floor.
    pub score_threshold: Option<f32>,
    /// Vector size used when a collection is created without an explicit one.
    pub vector_size: usize,
    /// Distance metric used when a collection is created without an explicit one.
    pub distance: Distance,
    /// Reserved payload key the chunk text is stored under.
    pub text_key: String,
    /// Append retrieved chunk texts to the generation input.
    pub include_context: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            search_limit: 10,
            score_threshold: Some(0.5),
            vector_size: 1024,
            distance: Distance::Cosine,
            text_key: "text".to_string(),
            include_context: false,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of search results.
    pub fn search_limit(mut self, limit: usize) -> Self {
        self.config.search_limit = limit;
        self
    }

    /// Set the default minimum similarity score.
    pub fn score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.config.score_threshold = threshold;
        self
    }

    /// Set the default vector size for new collections.
    pub fn vector_size(mut self, size: usize) -> Self {
        self.config.vector_size = size;
        self
    }

    /// Set the default distance metric for new collections.
    pub fn distance(mut self, distance: Distance) -> Self {
        self.config.distance = distance;
        self
    }

    /// Set the payload key the chunk text is merged under.
    pub fn text_key(mut self, key: impl Into<String>) -> Self {
        self.config.text_key = key.into();
        self
    }

    /// Thread retrieved chunk texts into the generation input.
    pub fn include_context(mut self, include: bool) -> Self {
        self.config.include_context = include;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `search_limit == 0`
    /// - `vector_size == 0`
    /// - `text_key` is empty
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.search_limit == 0 {
            return Err(RagError::ConfigError("search_limit must be greater than zero".to_string()));
        }
        if config.vector_size == 0 {
            return Err(RagError::ConfigError("vector_size must be greater than zero".to_string()));
        }
        if config.text_key.is_empty() {
            return Err(RagError::ConfigError("text_key must not be empty".to_string()));
        }
        Ok(config)
    }
}
