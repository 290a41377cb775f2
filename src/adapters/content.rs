//! Plain-text content extractor.
//!
//! Text-like formats pass through unchanged. Binary office formats (PDF,
//! Word) are handled by an external extraction service and are reported as
//! unsupported here.

use super::{ContentError, ContentExtractor};

/// Mime types (besides `text/*`) that are already plain text
const TEXT_LIKE: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
    "application/csv",
];

/// Passes text-like documents through unchanged
#[derive(Debug, Default, Clone)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Whether the mime type is handled without conversion
    pub fn is_text_like(mime_type: &str) -> bool {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        essence.starts_with("text/") || TEXT_LIKE.contains(&essence.as_str())
    }
}

impl ContentExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8], mime_type: &str) -> Result<String, ContentError> {
        if !Self::is_text_like(mime_type) {
            return Err(ContentError::Unsupported {
                mime_type: mime_type.to_string(),
            });
        }

        // Invalid sequences become U+FFFD rather than losing the document
        let text = String::from_utf8_lossy(bytes);
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

/// Guess a mime type from a file extension
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "txt" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
