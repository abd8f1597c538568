//! Embedding provider trait and vector similarity.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Ollama, etc.) behind a
/// unified async interface. Empty or whitespace-only input is a caller error
/// and must be rejected rather than embedded as a zero vector.
///
/// # Example
///
/// ```rust,ignore
/// use flare_rag::EmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434")?;
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially and preserves input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] for an empty batch.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RagError::InvalidInput("embedding batch must not be empty".to_string()));
        }
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Embed two texts and return the cosine similarity of their vectors.
    async fn text_similarity(&self, a: &str, b: &str) -> Result<f32> {
        let left = self.embed(a).await?;
        let right = self.embed(b).await?;
        Ok(cosine_similarity(&left, &right))
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Reject text that is empty after trimming.
pub(crate) fn ensure_non_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::InvalidInput("text to embed must not be empty".to_string()));
    }
    Ok(())
}

/// Compute cosine similarity between two vectors.
///
/// The result is clamped to `[-1, 1]` to absorb floating-point overshoot.
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Dot product of two vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}
