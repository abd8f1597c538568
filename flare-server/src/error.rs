//! Mapping from pipeline errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flare_rag::RagError;
use serde_json::json;
use tracing::{error, warn};

/// A [`RagError`] rendered as a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// The status code for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RagError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            RagError::NotInitialized(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::EmbeddingError { .. }
            | RagError::VectorStoreError { .. }
            | RagError::GenerationError { .. }
            | RagError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
            RagError::PipelineError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            e if e.is_input_error() || e.is_config_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Handler result type.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
