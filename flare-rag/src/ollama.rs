//! Ollama embedding provider using the `/api/embed` endpoint.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, ensure_non_empty};
use crate::error::{RagError, Result};

/// The default Ollama server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// The default embedding model.
pub const DEFAULT_MODEL: &str = "bge-m3:latest";

/// The dimensionality of `bge-m3` embeddings.
pub const DEFAULT_DIMENSIONS: usize = 1024;

/// An [`EmbeddingProvider`] backed by a local or remote Ollama server.
///
/// # Configuration
///
/// - `base_url` – defaults to `http://localhost:11434` (or `OLLAMA_BASE_URL`).
/// - `model` – defaults to `bge-m3:latest` (or `EMBEDDING_MODEL`).
/// - `dimensions` – defaults to 1024.
///
/// # Example
///
/// ```rust,ignore
/// use flare_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider talking to the given Ollama base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(RagError::ConfigError("Ollama base URL must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a provider from `OLLAMA_BASE_URL` and `EMBEDDING_MODEL`, falling
    /// back to the defaults when unset.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let provider = Self::new(base_url)?;
        Ok(match std::env::var("EMBEDDING_MODEL") {
            Ok(model) => provider.with_model(model),
            Err(_) => provider,
        })
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected output dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn upstream(message: impl Into<String>) -> RagError {
        RagError::EmbeddingError { provider: "Ollama".into(), message: message.into() }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Flatten an arbitrarily nested numeric JSON array into a single vector.
///
/// `/api/embed` answers `{"embeddings": [[...]]}` while older servers answer
/// `{"embedding": [...]}`; both collapse to one flat vector here.
pub(crate) fn flatten_embedding(value: &Value) -> Result<Vec<f32>> {
    fn walk(value: &Value, out: &mut Vec<f32>) -> Result<()> {
        match value {
            Value::Array(items) => items.iter().try_for_each(|item| walk(item, out)),
            Value::Number(n) => {
                let f = n.as_f64().ok_or_else(|| {
                    OllamaEmbeddingProvider::upstream(format!("non-finite number {n}"))
                })?;
                out.push(f as f32);
                Ok(())
            }
            other => Err(OllamaEmbeddingProvider::upstream(format!(
                "unexpected value in embedding: {other}"
            ))),
        }
    }

    let field = value
        .get("embeddings")
        .or_else(|| value.get("embedding"))
        .ok_or_else(|| OllamaEmbeddingProvider::upstream("response has no embeddings field"))?;

    let mut out = Vec::new();
    walk(field, &mut out)?;
    if out.is_empty() {
        return Err(OllamaEmbeddingProvider::upstream("API returned an empty embedding"));
    }
    Ok(out)
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(text)?;
        debug!(provider = "Ollama", model = %self.model, text_len = text.len(), "embedding text");

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest { model: &self.model, input: text })
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Ollama", error = %e, "request failed");
                Self::upstream(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = "Ollama", %status, "API error");
            return Err(Self::upstream(format!("API returned {status}: {body}")));
        }

        let body: Value = response.json().await.map_err(|e| {
            error!(provider = "Ollama", error = %e, "failed to parse response");
            Self::upstream(format!("failed to parse response: {e}"))
        })?;

        flatten_embedding(&body)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flattens_nested_embeddings() {
        let v = flatten_embedding(&json!({"embeddings": [[0.5, -1.0, 2.0]]})).unwrap();
        assert_eq!(v, vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn accepts_legacy_single_embedding() {
        let v = flatten_embedding(&json!({"embedding": [1, 2]})).unwrap();
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn empty_embedding_is_upstream_error() {
        let err = flatten_embedding(&json!({"embeddings": [[]]})).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingError { .. }));
        assert!(flatten_embedding(&json!({"model": "bge"})).is_err());
        assert!(flatten_embedding(&json!({"embeddings": ["x"]})).is_err());
    }

    #[tokio::test]
    async fn empty_text_fails_before_any_request() {
        // Port 9 (discard) is never contacted because validation runs first.
        let provider = OllamaEmbeddingProvider::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(provider.embed("   ").await, Err(RagError::InvalidInput(_))));
    }
}
