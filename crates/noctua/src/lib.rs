//! # Noctua
//!
//! Vector storage and retrieval engine for grounded question answering.
//!
//! Documents are split into overlapping chunks, embedded into fixed-dimension
//! vectors, and stored in an exact inner-product index with positionally
//! paired metadata. Queries are embedded with the same model and matched
//! against every stored chunk.
//!
//! ## Components
//!
//! - **Chunking**: recursive character splitting with overlap
//! - **Embedding**: pluggable backends behind one [`Embedder`] seam
//! - **Indexing**: exact inner-product flat index with synchronous
//!   persistence
//! - **Pipeline**: ingest and retrieve composed for an external orchestrator

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod pipeline;

pub use chunker::{Chunk, Chunker, ChunkerConfig, Document};
pub use embedding::{Embedder, HashEmbedder, HttpEmbedder};
pub use index::{FlatIndex, IndexStatus, ScoredChunk};
pub use pipeline::{ContextBundle, IngestReport, RetrievalConfig, RetrievalPipeline, SourceRef};
