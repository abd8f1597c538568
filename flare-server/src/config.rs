//! Environment-driven server configuration.

use std::path::PathBuf;
use std::str::FromStr;

use flare_rag::{RagConfig, RagError, Result};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default upload body limit (32 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Settings for the HTTP server and the collaborators it connects to.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub ollama_base_url: String,
    pub embedding_model: String,
    /// Generation is disabled when unset; `/query` then answers 503.
    pub llm_base_url: Option<String>,
    pub llm_base_model: String,
    pub llm_adapter_dir: Option<PathBuf>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            ollama_base_url: "http://localhost:11434".to_string(),
            embedding_model: "bge-m3:latest".to_string(),
            llm_base_url: None,
            llm_base_model: "flare-base".to_string(),
            llm_adapter_dir: None,
            chunk_size: 2000,
            chunk_overlap: 200,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`; unset keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when a numeric variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: text("FLARE_HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "FLARE_PORT")?.unwrap_or(defaults.port),
            qdrant_url: text("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            qdrant_api_key: text("QDRANT_API_KEY"),
            ollama_base_url: text("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            embedding_model: text("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            llm_base_url: text("LLM_BASE_URL"),
            llm_base_model: text("LLM_BASE_MODEL").unwrap_or(defaults.llm_base_model),
            llm_adapter_dir: text("LLM_ADAPTER_DIR").map(PathBuf::from),
            chunk_size: parse(&lookup, "CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse(&lookup, "CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            max_upload_bytes: parse(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
        })
    }

    /// The pipeline configuration implied by these settings.
    pub fn rag_config(&self) -> Result<RagConfig> {
        RagConfig::builder().chunk_size(self.chunk_size).chunk_overlap(self.chunk_overlap).build()
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::ConfigError(format!("{key}='{raw}' is invalid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8000);
        assert_eq!((config.chunk_size, config.chunk_overlap), (2000, 200));
    }

    #[test]
    fn reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("FLARE_PORT", "9100"),
            ("QDRANT_API_KEY", "secret"),
            ("LLM_BASE_URL", "http://gpu:8001"),
            ("LLM_ADAPTER_DIR", "lora_model"),
            ("CHUNK_SIZE", " 500 "),
        ]))
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.qdrant_api_key.as_deref(), Some("secret"));
        assert_eq!(config.llm_base_url.as_deref(), Some("http://gpu:8001"));
        assert_eq!(config.llm_adapter_dir, Some(PathBuf::from("lora_model")));
        assert_eq!(config.chunk_size, 500);
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = ServerConfig::from_lookup(lookup(&[("FLARE_PORT", "eighty")])).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("FLARE_PORT"));
    }

    #[test]
    fn rag_config_validates_chunking() {
        let config = ServerConfig { chunk_size: 100, chunk_overlap: 100, ..ServerConfig::default() };
        assert!(config.rag_config().is_err());
    }
}
