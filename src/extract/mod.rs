//! Document ingestion and chunking
//!
//! This module handles turning uploaded files into retrievable units:
//! - Format-specific extraction to plain text (Markdown, JSON, HTML, PDF, text)
//! - Overlapping, boundary-aware chunking with offset tracking

pub mod chunker;
pub mod doc;
pub mod html;

pub use chunker::{Chunk, ChunkConfig, Chunker};
pub use doc::{extract_bytes, extract_file};
pub use html::{ElementInfo, HtmlOutline};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute a stable hash for content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Kind of source document, used as retrieval metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Markdown,
    Json,
    Html,
    Pdf,
}

impl DocumentKind {
    /// Guess the kind from a file name's extension, defaulting to plain text
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "md" | "markdown" | "mdx" => DocumentKind::Markdown,
            "json" => DocumentKind::Json,
            "html" | "htm" => DocumentKind::Html,
            "pdf" => DocumentKind::Pdf,
            _ => DocumentKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::Markdown => "markdown",
            DocumentKind::Json => "json",
            DocumentKind::Html => "html",
            DocumentKind::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(DocumentKind::Text),
            "markdown" | "md" => Ok(DocumentKind::Markdown),
            "json" => Ok(DocumentKind::Json),
            "html" => Ok(DocumentKind::Html),
            "pdf" => Ok(DocumentKind::Pdf),
            other => Err(format!("unknown document kind: {}", other)),
        }
    }
}

/// A plain-text document ready for chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from source name and text
    pub id: String,
    /// Original file name
    pub source_name: String,
    /// Extracted plain text
    pub raw_text: String,
    /// Source format
    pub kind: DocumentKind,
}

impl Document {
    /// Create a new document
    pub fn new(source_name: &str, raw_text: &str, kind: DocumentKind) -> Self {
        let id = content_hash(&format!("{}\n{}", source_name, raw_text))[..16].to_string();

        Self {
            id,
            source_name: source_name.to_string(),
            raw_text: raw_text.to_string(),
            kind,
        }
    }
}
