//! Error types for the `flare-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval pipeline operations.
///
/// Variants fall into four groups: caller input errors, upstream service
/// errors, configuration errors and not-found conditions. Only upstream
/// errors are retried (see [`RagError::is_retryable`]).
#[derive(Debug, Error)]
pub enum RagError {
    /// The caller supplied input that can never succeed (empty text, etc.).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The document format is not supported by this build.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// A vector did not match the collection's configured dimensionality.
    #[error("Dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch {
        /// The collection's configured vector size.
        expected: usize,
        /// The size of the offending vector.
        actual: usize,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the text generation backend.
    #[error("Generation error ({backend}): {message}")]
    GenerationError {
        /// The generation backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An upstream operation kept failing until the retry budget ran out.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Name of the exhausted operation.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last underlying failure.
        #[source]
        source: Box<RagError>,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A component was used before it was started or after it was shut down.
    #[error("{0} not initialized")]
    NotInitialized(String),

    /// A filter could not be built (unknown combinator kind, malformed condition).
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A collection management action name was not recognized.
    #[error("Unknown collection action: {0}")]
    UnknownAction(String),

    /// A distance metric name was not recognized.
    #[error("Unknown distance metric: {0}")]
    UnknownDistance(String),

    /// The named collection does not exist.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether retrying the failed operation could plausibly succeed.
    ///
    /// Upstream service failures are retryable. Input, configuration and
    /// not-found errors are not, and neither is an already exhausted retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingError { .. }
                | RagError::VectorStoreError { .. }
                | RagError::GenerationError { .. }
        )
    }

    /// Whether this error is caused by the caller's input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RagError::InvalidInput(_)
                | RagError::UnsupportedFormat(_)
                | RagError::DimensionMismatch { .. }
                | RagError::ChunkingError(_)
        )
    }

    /// Whether this error is a configuration mistake.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RagError::ConfigError(_)
                | RagError::NotInitialized(_)
                | RagError::InvalidFilter(_)
                | RagError::UnknownAction(_)
                | RagError::UnknownDistance(_)
        )
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_errors_are_retryable() {
        let upstream = RagError::EmbeddingError { provider: "stub".into(), message: "503".into() };
        assert!(upstream.is_retryable());
        assert!(!RagError::InvalidInput("empty".into()).is_retryable());
        assert!(!RagError::NotInitialized("store".into()).is_retryable());
        assert!(!RagError::CollectionNotFound("docs".into()).is_retryable());

        let exhausted = RagError::RetriesExhausted {
            operation: "embed".into(),
            attempts: 3,
            source: Box::new(upstream),
        };
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn exhausted_error_names_operation_and_cause() {
        let err = RagError::RetriesExhausted {
            operation: "search".into(),
            attempts: 2,
            source: Box::new(RagError::VectorStoreError {
                backend: "qdrant".into(),
                message: "connection refused".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("search failed after 2 attempts"));
        assert!(msg.contains("connection refused"));
    }
}
