//! Data types for documents, chunks, points, and search results.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RagError, Result};

/// An open key-value mapping stored alongside each vector.
pub type Payload = Map<String, Value>;

/// The on-disk or on-the-wire format of a [`Document`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Plain text in any detectable encoding.
    Text,
    /// Portable Document Format, extracted page by page.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
}

impl DocumentFormat {
    /// Infer the format from a file extension (case-insensitive, without the dot).
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(RagError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            RagError::UnsupportedFormat(format!("no file extension on '{}'", path.display()))
        })?;
        Self::from_extension(extension)
    }
}

impl FromStr for DocumentFormat {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s.trim_start_matches('.'))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        };
        f.write_str(name)
    }
}

/// Raw document content awaiting text extraction.
///
/// Documents only live for the duration of an ingestion request; their text
/// is chunked and embedded, never stored as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The raw bytes as read from disk or received from a client.
    pub content: Vec<u8>,
    /// The declared or inferred format.
    pub format: DocumentFormat,
    /// A declared text encoding label (e.g. `"windows-1252"`); detected when `None`.
    pub encoding: Option<String>,
}

impl Document {
    /// Create a document from raw bytes with a format hint.
    pub fn from_bytes(content: impl Into<Vec<u8>>, format: DocumentFormat) -> Self {
        Self { content: content.into(), format, encoding: None }
    }

    /// Create a plain-text document from a UTF-8 string.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: text.into().into_bytes(),
            format: DocumentFormat::Text,
            encoding: Some("utf-8".to_string()),
        }
    }

    /// Read a document from disk, inferring the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if the file does not exist or cannot
    /// be read, and [`RagError::UnsupportedFormat`] for unknown extensions.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = DocumentFormat::from_path(path)?;
        let content = std::fs::read(path).map_err(|e| {
            RagError::InvalidInput(format!("cannot read '{}': {e}", path.display()))
        })?;
        Ok(Self { content, format, encoding: None })
    }

    /// Declare the text encoding instead of detecting it.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// A contiguous piece of a document's extracted text.
///
/// Offsets are character (not byte) positions of the untrimmed window the
/// chunk was cut from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The trimmed chunk text.
    pub text: String,
    /// Character offset where the window starts.
    pub start: usize,
    /// Character offset one past the window end.
    pub end: usize,
}

/// A persisted retrieval unit: an id, its vector, and an open payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point {
    /// Caller-opaque unique identifier.
    pub id: String,
    /// Dense vector matching the collection's configured size.
    pub vector: Vec<f32>,
    /// Arbitrary payload; the chunk text lives under the reserved text key.
    #[serde(default)]
    pub payload: Payload,
}

impl Point {
    /// Create a point from its parts.
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: Payload) -> Self {
        Self { id: id.into(), vector, payload }
    }
}

/// A retrieved point paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The point identifier.
    pub id: String,
    /// The similarity score (higher is more relevant).
    pub score: f32,
    /// The stored payload.
    pub payload: Payload,
}

impl SearchResult {
    /// Return the string stored under `key`, if any.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(".docx".parse::<DocumentFormat>().unwrap(), DocumentFormat::Docx);
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.txt")).unwrap(), DocumentFormat::Text);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = DocumentFormat::from_extension("pptx").unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat(_)));
        assert!(DocumentFormat::from_path(Path::new("README")).is_err());
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = Document::from_path("/definitely/not/here.txt").unwrap_err();
        assert!(err.is_input_error());
    }
}
