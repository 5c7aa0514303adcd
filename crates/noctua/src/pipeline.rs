//! Ingest and retrieval composition.

use std::sync::Arc;

use noctua_core::{Error, Result};

use crate::chunker::{Chunker, Document};
use crate::embedding::Embedder;
use crate::index::{FlatIndex, ScoredChunk};

/// Maximum characters of chunk text carried into a [`SourceRef`].
const SOURCE_PREVIEW_CHARS: usize = 200;

/// Retrieval tuning knobs.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Default number of matches returned by [`RetrievalPipeline::retrieve`].
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Outcome of an ingest run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Number of chunks embedded and stored.
    pub chunk_count: usize,
    /// Per-document problems that did not abort the run.
    pub errors: Vec<String>,
}

/// Context handed to an answer-generation consumer.
///
/// Answer generation itself is out of scope here; this is the hand-off
/// shape.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    /// Retrieved chunk texts joined by a blank line.
    pub context: String,
    /// Ranked provenance records for display.
    pub sources: Vec<SourceRef>,
}

/// One ranked source reference inside a [`ContextBundle`].
#[derive(Debug, Clone)]
pub struct SourceRef {
    /// 1-based rank.
    pub index: usize,
    /// Chunk text truncated to 200 characters, with an ellipsis when cut.
    pub text: String,
    /// Inner-product similarity of the match.
    pub similarity: f32,
}

/// Composes chunking, embedding, and the flat index into the two public
/// operations of the engine: ingest and retrieve.
///
/// One embedder instance is injected into both paths, so index-time and
/// query-time encodings come from the same model.
pub struct RetrievalPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<FlatIndex>,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    /// Creates a pipeline over the given collaborators.
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        index: Arc<FlatIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            config,
        }
    }

    /// Shared index handle.
    #[must_use]
    pub fn index(&self) -> &Arc<FlatIndex> {
        &self.index
    }

    /// Chunks, embeds, and stores the given documents.
    ///
    /// Documents with no text are skipped and reported in the returned
    /// [`IngestReport`] rather than aborting the batch.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the document list is empty, if
    /// chunking produces nothing, or if embedding yields zero vectors;
    /// embedding failures propagate as upstream errors.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        if documents.is_empty() {
            return Err(Error::validation("cannot ingest an empty document list"));
        }

        let mut errors = Vec::new();
        let mut usable = Vec::new();
        for document in documents {
            if document.text.trim().is_empty() {
                let label = document.source.as_deref().unwrap_or("<unnamed document>");
                tracing::warn!(source = label, "skipping document with no text");
                errors.push(format!("document has no text: {label}"));
            } else {
                usable.push(document.clone());
            }
        }

        let chunks = self.chunker.chunk(&usable);
        if chunks.is_empty() {
            return Err(Error::validation(
                "no chunks produced from the supplied documents",
            ));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.is_empty() {
            return Err(Error::validation("embedding produced no vectors"));
        }

        let chunk_count = self
            .index
            .add(vectors, chunks.into_iter().map(|c| c.text).collect())?;

        tracing::info!(chunk_count, skipped = errors.len(), "ingest complete");
        Ok(IngestReport {
            chunk_count,
            errors,
        })
    }

    /// Embeds the query and returns the ranked matches.
    ///
    /// `top_k` falls back to the configured default when `None`. An
    /// initialized but empty index yields an empty list; every genuine
    /// failure propagates.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank query or an uninitialized
    /// index; embedding failures propagate as upstream errors.
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(Error::validation("query text cannot be empty"));
        }

        let top_k = top_k.unwrap_or(self.config.top_k);
        let query_vector = self.embedder.embed_one(query).await?;
        self.index.search(&query_vector, top_k)
    }

    /// Assembles the consumer-facing context block from ranked matches.
    #[must_use]
    pub fn build_context(&self, results: &[ScoredChunk]) -> ContextBundle {
        let context = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let sources = results
            .iter()
            .enumerate()
            .map(|(i, r)| SourceRef {
                index: i + 1,
                text: truncate_chars(&r.text, SOURCE_PREVIEW_CHARS),
                similarity: r.score,
            })
            .collect();

        ContextBundle { context, sources }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str("...");
    truncated
}
