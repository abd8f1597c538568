//! Text generation against an OpenAI-compatible completions server.
//!
//! Targets inference servers (vLLM and similar) that expose `/v1/completions`
//! and can attach LoRA adapters at runtime through `/v1/load_lora_adapter`.
//! When an adapter root is configured, [`TextGenerator::load`] locates the
//! newest `checkpoint-<N>` directory beneath it and registers it with the
//! server; completions are then routed to the adapter.
//!
//! This module is only available when the `openai-compat` feature is enabled.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::checkpoint::find_latest_checkpoint;
use crate::error::{RagError, Result};
use crate::generation::{SamplingParams, TextGenerator};

/// Name under which the fine-tuned adapter is registered with the server.
pub const ADAPTER_NAME: &str = "flare-adapter";

const BACKEND: &str = "openai-compat";

/// A [`TextGenerator`] backed by an OpenAI-compatible completions endpoint.
///
/// # Configuration
///
/// - `base_url` – server root, e.g. `http://localhost:8001` (or `LLM_BASE_URL`).
/// - `base_model` – model served without an adapter (or `LLM_BASE_MODEL`).
/// - `adapter_root` – directory holding `checkpoint-<N>` folders (or `LLM_ADAPTER_DIR`).
/// - `api_key` – optional bearer token.
///
/// # Example
///
/// ```rust,ignore
/// use flare_rag::openai_compat::OpenAiCompatGenerator;
///
/// let generator = OpenAiCompatGenerator::new("http://localhost:8001", "qwen2.5-7b", Some("lora_model".into()))?;
/// ```
pub struct OpenAiCompatGenerator {
    client: reqwest::Client,
    base_url: String,
    base_model: String,
    adapter_root: Option<PathBuf>,
    api_key: Option<String>,
    served_model: RwLock<Option<String>>,
}

impl OpenAiCompatGenerator {
    /// Create a generator for the given server and base model.
    pub fn new(
        base_url: impl Into<String>,
        base_model: impl Into<String>,
        adapter_root: Option<PathBuf>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let base_model = base_model.into();
        if base_url.is_empty() {
            return Err(RagError::ConfigError("LLM base URL must not be empty".into()));
        }
        if base_model.is_empty() {
            return Err(RagError::ConfigError("LLM base model must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            base_model,
            adapter_root,
            api_key: None,
            served_model: RwLock::new(None),
        })
    }

    /// Set a bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// The model name completions are currently routed to, once loaded.
    pub fn served_model(&self) -> Option<String> {
        self.served_model.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_served_model(&self, model: Option<String>) {
        *self.served_model.write().unwrap_or_else(PoisonError::into_inner) = model;
    }

    fn upstream(message: impl Into<String>) -> RagError {
        RagError::GenerationError { backend: BACKEND.into(), message: message.into() }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        error!(backend = BACKEND, %status, "API error");
        Err(Self::upstream(format!("API returned {status}: {detail}")))
    }
}

#[derive(Serialize)]
struct LoadAdapterRequest<'a> {
    lora_name: &'a str,
    lora_path: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl TextGenerator for OpenAiCompatGenerator {
    async fn load(&self) -> Result<()> {
        let Some(root) = &self.adapter_root else {
            let response = self
                .request(self.client.get(format!("{}/v1/models", self.base_url)))
                .send()
                .await
                .map_err(|e| Self::upstream(format!("server unreachable: {e}")))?;
            Self::check(response).await?;
            self.set_served_model(Some(self.base_model.clone()));
            info!(backend = BACKEND, model = %self.base_model, "using base model");
            return Ok(());
        };

        let checkpoint = find_latest_checkpoint(root)?;
        let lora_path = checkpoint.to_string_lossy();
        let response = self
            .request(self.client.post(format!("{}/v1/load_lora_adapter", self.base_url)))
            .json(&LoadAdapterRequest { lora_name: ADAPTER_NAME, lora_path: &lora_path })
            .send()
            .await
            .map_err(|e| Self::upstream(format!("adapter load request failed: {e}")))?;
        Self::check(response).await?;

        self.set_served_model(Some(ADAPTER_NAME.to_string()));
        info!(backend = BACKEND, checkpoint = %lora_path, "adapter loaded");
        Ok(())
    }

    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String> {
        let model = self
            .served_model()
            .ok_or_else(|| RagError::NotInitialized("OpenAI-compatible generator".into()))?;
        debug!(backend = BACKEND, model = %model, prompt_len = prompt.len(), "requesting completion");

        let response = self
            .request(self.client.post(format!("{}/v1/completions", self.base_url)))
            .json(&CompletionRequest {
                model: &model,
                prompt,
                max_tokens: sampling.max_new_tokens,
                temperature: sampling.temperature,
                top_p: sampling.top_p,
            })
            .send()
            .await
            .map_err(|e| {
                error!(backend = BACKEND, error = %e, "request failed");
                Self::upstream(format!("request failed: {e}"))
            })?;

        let body: CompletionResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Self::upstream(format!("failed to parse response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| Self::upstream("API returned no choices"))
    }

    async fn unload(&self) -> Result<()> {
        self.set_served_model(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_configuration() {
        assert!(OpenAiCompatGenerator::new("", "m", None).is_err());
        assert!(OpenAiCompatGenerator::new("http://x", "", None).is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let generator = OpenAiCompatGenerator::new("http://localhost:8001/", "m", None).unwrap();
        assert_eq!(generator.base_url, "http://localhost:8001");
        assert!(generator.served_model().is_none());
    }

    #[tokio::test]
    async fn complete_before_load_is_not_initialized() {
        let generator = OpenAiCompatGenerator::new("http://localhost:1", "m", None).unwrap();
        let err = generator.complete("p", &SamplingParams::default()).await.unwrap_err();
        assert!(matches!(err, RagError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn load_without_checkpoints_fails_retryably() {
        let dir = tempfile::tempdir().unwrap();
        let generator =
            OpenAiCompatGenerator::new("http://localhost:1", "m", Some(dir.path().to_path_buf()))
                .unwrap();
        let err = generator.load().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn completion_request_shape() {
        let body = serde_json::to_value(CompletionRequest {
            model: ADAPTER_NAME,
            prompt: "p",
            max_tokens: 512,
            temperature: 0.5,
            top_p: 0.9,
        })
        .unwrap();
        assert_eq!(body["model"], ADAPTER_NAME);
        assert_eq!(body["max_tokens"], 512);
    }
}
