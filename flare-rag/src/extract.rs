//! Text extraction from uploaded documents.
//!
//! Plain text is decoded to UTF-8 regardless of its source encoding: a
//! declared label wins, then a byte-order mark, then a BOM-less UTF-16
//! heuristic, then strict UTF-8, and finally statistical detection with
//! `chardetng`. PDF (feature `pdf`) and DOCX (feature `docx`) are extracted
//! with `lopdf` and `zip` respectively.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use tracing::debug;

use crate::document::{Document, DocumentFormat};
use crate::error::{RagError, Result};

/// Text pulled out of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Normalized UTF-8 text.
    pub text: String,
    /// The encoding the bytes were decoded from, for text documents.
    pub encoding: Option<String>,
}

/// Extract UTF-8 text from a document.
///
/// # Errors
///
/// - [`RagError::ConfigError`] for an unknown declared encoding label
/// - [`RagError::UnsupportedFormat`] when the format's feature is disabled
/// - [`RagError::InvalidInput`] for corrupt PDF or DOCX content
pub fn extract_text(document: &Document) -> Result<ExtractedText> {
    let extracted = match document.format {
        DocumentFormat::Text => {
            let (text, encoding) = decode_text(&document.content, document.encoding.as_deref())?;
            ExtractedText { text, encoding: Some(encoding.name().to_string()) }
        }
        DocumentFormat::Pdf => ExtractedText { text: extract_pdf(&document.content)?, encoding: None },
        DocumentFormat::Docx => {
            ExtractedText { text: extract_docx(&document.content)?, encoding: None }
        }
    };
    debug!(
        format = %document.format,
        bytes = document.content.len(),
        chars = extracted.text.chars().count(),
        "extracted document text"
    );
    Ok(extracted)
}

/// Decode bytes to normalized UTF-8, returning the encoding that was used.
pub fn decode_text(bytes: &[u8], declared: Option<&str>) -> Result<(String, &'static Encoding)> {
    let (text, encoding) = match declared {
        Some(label) => {
            let encoding = Encoding::for_label(label.trim().as_bytes())
                .ok_or_else(|| RagError::ConfigError(format!("unknown encoding '{label}'")))?;
            let (text, _) = encoding.decode_with_bom_removal(bytes);
            (text.into_owned(), encoding)
        }
        None => detect_and_decode(bytes),
    };
    Ok((normalize(&text), encoding))
}

fn detect_and_decode(bytes: &[u8]) -> (String, &'static Encoding) {
    if bytes.is_empty() {
        return (String::new(), UTF_8);
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _, _) = encoding.decode(&bytes[bom_len..]);
        return (text.into_owned(), encoding);
    }

    // NUL bytes are valid UTF-8, so the UTF-16 heuristic must run first.
    // Big-endian if the first unit starts with 0.
    let nul_ratio = bytes.iter().filter(|&&b| b == 0).count() as f32 / bytes.len() as f32;
    if nul_ratio > 0.2 {
        let encoding = if bytes.first() == Some(&0) && bytes.get(1).is_some_and(|&b| b != 0) {
            UTF_16BE
        } else {
            UTF_16LE
        };
        let (text, _, _) = encoding.decode(bytes);
        return (text.into_owned(), encoding);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), UTF_8);
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(bytes);
    (text.into_owned(), encoding)
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim_matches(['\u{FEFF}', '\0']).to_string()
}

#[cfg(feature = "pdf")]
fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::InvalidInput(format!("invalid PDF: {e}")))?;

    let mut text = String::new();
    for page in pdf.get_pages().into_keys() {
        match pdf.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => debug!(page, error = %e, "skipping page without extractable text"),
        }
    }
    Ok(normalize(&text))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_bytes: &[u8]) -> Result<String> {
    Err(RagError::UnsupportedFormat("pdf support is not enabled".into()))
}

#[cfg(feature = "docx")]
fn extract_docx(bytes: &[u8]) -> Result<String> {
    use std::io::Read;
    use std::sync::LazyLock;

    use regex::Regex;

    // A self-closing `<w:p/>` is an empty paragraph.
    static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>.*?</w:p>)").expect("valid paragraph regex")
    });
    static RUN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("valid run text regex")
    });

    let invalid = |e: &dyn std::fmt::Display| RagError::InvalidInput(format!("invalid DOCX: {e}"));

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| invalid(&e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| invalid(&e))?
        .read_to_string(&mut xml)
        .map_err(|e| invalid(&e))?;

    let paragraphs: Vec<String> = PARAGRAPH
        .find_iter(&xml)
        .map(|paragraph| {
            RUN_TEXT
                .captures_iter(paragraph.as_str())
                .filter_map(|caps| caps.get(1))
                .map(|run| unescape_xml(run.as_str()))
                .collect::<String>()
        })
        .collect();
    Ok(normalize(&paragraphs.join("\n")))
}

/// Decode the predefined XML entities and numeric character references.
/// References to invalid code points are kept verbatim.
#[cfg(feature = "docx")]
fn unescape_xml(text: &str) -> String {
    use std::sync::LazyLock;

    use regex::{Captures, Regex};

    static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").expect("valid entity regex")
    });

    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => name[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(not(feature = "docx"))]
fn extract_docx(_bytes: &[u8]) -> Result<String> {
    Err(RagError::UnsupportedFormat("docx support is not enabled".into()))
}
