//! Document chunking.
//!
//! Splitting is recursive: the largest separator (paragraph, then line, then
//! sentence, then word) that produces pieces under the size budget wins, and
//! a fixed character window with overlap is the last resort. This keeps
//! chunks from severing mid-sentence where the text allows it.

use noctua_core::{Error, Result};

/// A raw input document supplied by the document-loading collaborator.
#[derive(Debug, Clone)]
pub struct Document {
    /// Full document text.
    pub text: String,
    /// Display label for the origin (file path, URL), if known.
    pub source: Option<String>,
}

impl Document {
    /// Creates a document from raw text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
        }
    }

    /// Sets the origin label.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A bounded segment of a document, the unit of embedding and retrieval.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text.
    pub text: String,
    /// Global position of the chunk across the whole chunking run,
    /// preserving original order for future ranking tie-breaks.
    pub source_order: usize,
}

/// Configuration for [`Chunker`].
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters of overlap carried between adjacent chunks.
    pub overlap: usize,
    /// Separators tried in order, largest semantic boundary first.
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

/// Splits documents into overlapping chunks.
///
/// Pure transformation; no side effects. A merged window may run past
/// `chunk_size` by the overlap characters carried from its predecessor.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Creates a new chunker.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `chunk_size` is zero or `overlap` is
    /// not strictly smaller than `chunk_size`.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::validation("chunk_size must be positive"));
        }
        if config.overlap >= config.chunk_size {
            return Err(Error::validation(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                config.overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    /// Splits every document into overlapping windows.
    ///
    /// Empty input produces empty output, not an error. Whitespace-only
    /// pieces are dropped.
    #[must_use]
    pub fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            for piece in self.split_text(&document.text) {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    text: piece,
                    source_order: chunks.len(),
                });
            }
        }
        chunks
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        // Splitting produces raw pieces no longer than `chunk_size`;
        // merging happens exactly once, here, so no merged window is ever
        // fed back in as a piece.
        let pieces = self.split_pieces(text, &self.config.separators);
        self.merge_pieces(pieces)
    }

    fn split_pieces(&self, text: &str, separators: &[String]) -> Vec<String> {
        if char_len(text) <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let Some((separator, rest)) = separators.split_first() else {
            return self.split_fixed(text);
        };
        if !text.contains(separator.as_str()) {
            return self.split_pieces(text, rest);
        }

        // Separators stay attached to the preceding piece; any piece still
        // over budget falls through to the next, smaller boundary.
        let mut pieces = Vec::new();
        for part in text.split_inclusive(separator.as_str()) {
            if char_len(part) > self.config.chunk_size {
                pieces.extend(self.split_pieces(part, rest));
            } else {
                pieces.push(part.to_string());
            }
        }
        pieces
    }

    /// Greedily packs pieces into windows near `chunk_size`, seeding each
    /// new window with the tail of the previous one.
    fn merge_pieces(&self, pieces: Vec<String>) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for piece in pieces {
            let piece_len = char_len(&piece);
            if current_len > 0 && current_len + piece_len > self.config.chunk_size {
                let tail = char_tail(&current, self.config.overlap);
                windows.push(std::mem::take(&mut current));
                current_len = char_len(&tail);
                current = tail;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }

        if !current.is_empty() {
            windows.push(current);
        }
        windows
    }

    /// Fixed character windows; the last resort when no separator produces
    /// pieces under the budget. Overlap between the final windows is
    /// applied by the merge step, like every other piece.
    fn split_fixed(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.config.chunk_size)
            .map(|window| window.iter().collect())
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn char_tail(text: &str, count: usize) -> String {
    let len = char_len(text);
    if len <= count {
        return text.to_string();
    }
    text.chars().skip(len - count).collect()
}
