//! Overlapping window chunker
//!
//! Splits document text into windows of at most `max_size` characters where
//! consecutive windows share exactly `overlap` characters. A window that would
//! cut through the middle of text is pulled back to the latest paragraph,
//! sentence, line or word boundary it contains.
//!
//! Sizes and offsets are counted in characters (Unicode scalar values), and
//! every chunk's text is the exact slice of the original between its offsets.

use super::{Document, DocumentKind};
use crate::error::{QaError, Result};
use serde::{Deserialize, Serialize};

/// Boundaries tried in order of preference, with the number of characters
/// the break lands after the match position.
const PARAGRAPH_BREAK: (&str, usize) = ("\n\n", 2);
const SENTENCE_BREAKS: &[(&str, usize)] = &[(". ", 2), ("! ", 2), ("? ", 2)];
const LINE_BREAK: (&str, usize) = ("\n", 1);
const WORD_BREAK: (&str, usize) = (" ", 1);

/// A retrievable slice of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (document id + sequence index)
    pub id: String,
    /// Owning document
    pub document_id: String,
    /// Source file name of the owning document
    pub source_name: String,
    /// Source format of the owning document
    pub kind: DocumentKind,
    /// Exact text between the offsets
    pub text: String,
    /// Start offset in characters (inclusive)
    pub start_offset: usize,
    /// End offset in characters (exclusive)
    pub end_offset: usize,
    /// Position of this chunk within its document
    pub sequence_index: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Window configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum window size in characters
    pub max_size: usize,
    /// Characters shared by consecutive windows
    pub overlap: usize,
}

impl ChunkConfig {
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(QaError::invalid_argument("chunk max_size must be positive"));
        }
        if overlap >= max_size {
            return Err(QaError::invalid_argument(format!(
                "chunk overlap ({}) must be smaller than max_size ({})",
                overlap, max_size
            )));
        }
        Ok(Self { max_size, overlap })
    }

    /// Boundaries closer than this to the window start are ignored so each
    /// window still advances past the overlap.
    fn min_break(&self) -> usize {
        (self.max_size / 2).max(self.overlap + 1)
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            overlap: 50,
        }
    }
}

/// Splits documents into overlapping chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split a document into chunks. Blank documents produce no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.raw_text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte position of every character, plus the end of text
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let max_size = self.config.max_size;
        let overlap = self.config.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let mut end = (start + max_size).min(total);

            if end < total {
                if let Some(b) = self.find_break_point(text, &bounds, start, end) {
                    end = b;
                }
            }

            chunks.push(Chunk {
                id: format!("{}-{:04}", document.id, chunks.len()),
                document_id: document.id.clone(),
                source_name: document.source_name.clone(),
                kind: document.kind,
                text: text[bounds[start]..bounds[end]].to_string(),
                start_offset: start,
                end_offset: end,
                sequence_index: chunks.len(),
            });

            // A window cut short by the end of text is the last one
            if end == total && end - start < max_size {
                break;
            }

            start = if end > start + overlap { end - overlap } else { end };
        }

        tracing::debug!(
            "Chunked {} into {} chunks ({} chars)",
            document.source_name,
            chunks.len(),
            total
        );

        chunks
    }

    /// Find the preferred boundary inside `[start, end)`, as a character offset
    fn find_break_point(
        &self,
        text: &str,
        bounds: &[usize],
        start: usize,
        end: usize,
    ) -> Option<usize> {
        let window = &text[bounds[start]..bounds[end]];
        let min = start + self.config.min_break();

        let last_match = |(needle, advance): (&str, usize)| {
            window
                .rfind(needle)
                .map(|pos| start + window[..pos].chars().count() + advance)
                .filter(|&offset| offset > min && offset <= end)
        };

        last_match(PARAGRAPH_BREAK)
            .or_else(|| SENTENCE_BREAKS.iter().filter_map(|b| last_match(*b)).max())
            .or_else(|| last_match(LINE_BREAK))
            .or_else(|| last_match(WORD_BREAK))
    }
}
