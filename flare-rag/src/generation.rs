//! Text generation with retries and response memoization.
//!
//! [`GenerationClient`] owns a [`TextGenerator`] backend, a [`RetryPolicy`]
//! and a [`ResponseCache`]. The backend must be loaded once through
//! [`GenerationClient::initialize`] before any request is served.
//!
//! # Example
//!
//! ```rust,ignore
//! use flare_rag::{GenerationClient, GenerationConfig};
//!
//! let client = GenerationClient::new(Arc::new(generator), GenerationConfig::default());
//! client.initialize().await?;
//! let answer = client.generate("Summarize", "Rust is a systems language.").await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheStats, DEFAULT_CAPACITY, ResponseCache};
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// Marker after which the model's answer begins.
pub const OUTPUT_MARKER: &str = "Output:";

/// Sampling parameters forwarded to the backend with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Maximum number of tokens to generate.
    pub max_new_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { max_new_tokens: 512, temperature: 0.7, top_p: 0.9 }
    }
}

/// Configuration for a [`GenerationClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Total attempts for loading and for each generation request.
    pub max_retries: u32,
    /// Constant delay between attempts.
    pub retry_delay: Duration,
    /// Maximum number of memoized responses.
    pub cache_capacity: usize,
    /// Sampling parameters.
    pub sampling: SamplingParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            cache_capacity: DEFAULT_CAPACITY,
            sampling: SamplingParams::default(),
        }
    }
}

impl GenerationConfig {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

/// A text-generation backend reached over some external protocol.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One-time preparation (locating weights, attaching adapters).
    async fn load(&self) -> Result<()>;

    /// Complete a fully assembled prompt, returning the raw model output.
    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String>;

    /// Release backend resources. The default does nothing.
    async fn unload(&self) -> Result<()> {
        Ok(())
    }
}

/// Assemble the fixed instruction/input prompt.
pub fn build_prompt(instruction: &str, input: &str) -> String {
    format!("Instruction: {instruction}\nInput: {input}\n{OUTPUT_MARKER}")
}

/// Keep only the text after the last output marker, trimmed.
///
/// Backends that echo the prompt return it followed by the answer; backends
/// that don't return the answer alone. Both reduce to the answer.
pub fn extract_output(raw: &str) -> &str {
    raw.rsplit(OUTPUT_MARKER).next().unwrap_or(raw).trim()
}

/// Generation client with constant-backoff retries and an LRU response cache.
pub struct GenerationClient {
    generator: Arc<dyn TextGenerator>,
    config: GenerationConfig,
    cache: ResponseCache,
    initialized: AtomicBool,
    /// Serializes load and unload so the backend is loaded at most once.
    lifecycle: Mutex<()>,
}

impl GenerationClient {
    /// Wrap a backend. Call [`initialize`](Self::initialize) before generating.
    pub fn new(generator: Arc<dyn TextGenerator>, config: GenerationConfig) -> Self {
        let cache = ResponseCache::new(config.cache_capacity);
        Self {
            generator,
            config,
            cache,
            initialized: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Load the backend, retrying with the configured constant delay.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::RetriesExhausted`] when every load attempt fails.
    pub async fn initialize(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_initialized() {
            return Ok(());
        }
        self.config.retry_policy().run("load model", || self.generator.load()).await?;
        self.initialized.store(true, Ordering::Release);
        info!(max_retries = self.config.max_retries, "generation backend loaded");
        Ok(())
    }

    /// Generate a response for `(instruction, input)`.
    ///
    /// Identical pairs are answered from the cache without calling the backend.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotInitialized`] before [`initialize`](Self::initialize)
    /// - [`RagError::RetriesExhausted`] when every attempt fails
    pub async fn generate(&self, instruction: &str, input: &str) -> Result<String> {
        if !self.is_initialized() {
            return Err(RagError::NotInitialized("generation client".to_string()));
        }

        if let Some(cached) = self.cache.get(instruction, input) {
            debug!(instruction_len = instruction.len(), "generation cache hit");
            return Ok(cached);
        }

        let prompt = build_prompt(instruction, input);
        let sampling = self.config.sampling;
        let raw = self
            .config
            .retry_policy()
            .run("generate", || self.generator.complete(&prompt, &sampling))
            .await?;

        let response = extract_output(&raw).to_string();
        self.cache.put(instruction, input, response.clone());
        debug!(response_len = response.len(), "generated response");
        Ok(response)
    }

    /// Drop every memoized response.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Unload the backend and clear the cache. Later calls need a new
    /// [`initialize`](Self::initialize).
    pub async fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.initialized.swap(false, Ordering::AcqRel) {
            self.cache.clear();
            self.generator.unload().await?;
            info!("generation backend unloaded");
        }
        Ok(())
    }
}
