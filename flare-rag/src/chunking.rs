//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`BoundaryChunker`], which
//! walks a fixed-size window over the text and pulls the window's right edge
//! back to the nearest sentence or line boundary when one exists.

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Boundary separators, most preferred first.
const SEPARATORS: [&str; 4] = [". ", "! ", "? ", "\n"];

/// A strategy for splitting extracted text into chunks.
///
/// Implementations return chunks in document order. Empty input yields an
/// empty `Vec`.
pub trait Chunker: Send + Sync {
    /// Split text into chunks.
    fn split(&self, text: &str) -> Vec<Chunk>;
}

/// Splits text into overlapping windows cut at semantic boundaries.
///
/// Sizes and offsets are measured in characters, not bytes, so multi-byte
/// text is never cut inside a code point.
///
/// # Example
///
/// ```rust,ignore
/// use flare_rag::BoundaryChunker;
///
/// let chunker = BoundaryChunker::new(1000, 200)?;
/// let chunks = chunker.split(&text);
/// ```
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl BoundaryChunker {
    /// Create a new `BoundaryChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`, either of which would stall the window.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// The configured maximum chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The configured overlap.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for BoundaryChunker {
    fn split(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut cursor = 0;

        while cursor < len {
            let mut end = (cursor + self.chunk_size).min(len);
            if end < len {
                if let Some(pos) = rfind_boundary(&chars, cursor, end) {
                    end = pos + 1;
                }
            }

            let window: String = chars[cursor..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(Chunk { text: trimmed.to_string(), start: cursor, end });
            }

            if end >= len {
                break;
            }
            // A boundary close to the cursor can leave less than `chunk_overlap`
            // characters of progress; step to the window end instead of backwards.
            let next = end.saturating_sub(self.chunk_overlap);
            cursor = if next > cursor { next } else { end };
        }

        chunks
    }
}

/// Split `text` with a one-off [`BoundaryChunker`].
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] for an invalid size/overlap pair.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    Ok(BoundaryChunker::new(chunk_size, chunk_overlap)?.split(text))
}

/// Find the start of the last separator lying entirely inside `chars[start..end]`,
/// trying separators in preference order.
fn rfind_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    SEPARATORS.iter().find_map(|separator| {
        let sep: Vec<char> = separator.chars().collect();
        if end - start < sep.len() {
            return None;
        }
        (start..=end - sep.len()).rev().find(|&i| chars[i..i + sep.len()] == sep[..])
    })
}
