//! Command implementations for the Noctua CLI.

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};
use noctua::{
    Chunker, ChunkerConfig, Document, Embedder, FlatIndex, HashEmbedder, HttpEmbedder,
    IndexStatus, RetrievalConfig, RetrievalPipeline,
};

use crate::config::Config;

/// Loads the given files and ingests them into the index.
pub async fn ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let (documents, load_errors) = load_documents(paths);

    if documents.is_empty() {
        return Err(eyre!(
            "no documents loaded ({} file errors)",
            load_errors.len()
        ));
    }

    let report = pipeline.ingest(&documents).await?;

    println!(
        "Indexed {} chunks from {} documents",
        report.chunk_count,
        documents.len()
    );
    for error in load_errors.iter().chain(&report.errors) {
        println!("  warning: {error}");
    }
    Ok(())
}

/// Queries the index and prints ranked sources.
pub async fn query(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    if pipeline.index().status() == IndexStatus::Uninitialized {
        println!("The index is empty. Run `noctua ingest <files>` first.");
        return Ok(());
    }

    let results = pipeline.retrieve(query, top_k).await?;
    if results.is_empty() {
        println!("No matches found.");
        return Ok(());
    }

    let bundle = pipeline.build_context(&results);
    for source in &bundle.sources {
        println!("[{}] similarity {:.3}", source.index, source.similarity);
        println!("    {}", source.text.replace('\n', " "));
    }
    Ok(())
}

/// Prints the index status.
pub fn stats(config: &Config) -> Result<()> {
    let index = open_index(config)?;
    match index.status() {
        IndexStatus::Uninitialized => {
            println!("Index: uninitialized ({})", config.store_dir.display());
        }
        status => println!(
            "Index: {:?}, {} entries, dimension {} ({})",
            status,
            index.len(),
            index.dimension().unwrap_or(0),
            config.store_dir.display()
        ),
    }
    Ok(())
}

/// Removes the persisted artifacts and resets the index.
pub fn clear(config: &Config) -> Result<()> {
    let index = FlatIndex::new(&config.store_dir)?;
    index.clear()?;
    println!("Cleared index at {}", config.store_dir.display());
    Ok(())
}

/// Reads each path as UTF-8 text, accumulating per-file errors instead of
/// aborting the batch.
fn load_documents(paths: &[PathBuf]) -> (Vec<Document>, Vec<String>) {
    let mut documents = Vec::new();
    let mut errors = Vec::new();

    for path in paths {
        if !path.exists() {
            let message = format!("file not found: {}", path.display());
            tracing::warn!("{message}");
            errors.push(message);
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(text) => {
                documents.push(Document::new(text).with_source(path.display().to_string()));
            }
            Err(e) => {
                let message = format!("error reading {}: {e}", path.display());
                tracing::warn!("{message}");
                errors.push(message);
            }
        }
    }

    (documents, errors)
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider.as_str() {
        "openai" => {
            let mut embedder =
                HttpEmbedder::new(config.embedding.model.clone(), config.embedding.dimension)
                    .with_base_url(config.embedding.base_url.clone());
            if let Some(api_key) = &config.embedding.api_key {
                embedder = embedder.with_api_key(api_key.clone());
            }
            Ok(Arc::new(embedder))
        }
        "hash" => {
            let embedder = HashEmbedder::new(config.embedding.dimension)?;
            Ok(Arc::new(embedder))
        }
        other => Err(eyre!(
            "unknown embedding provider '{other}' (expected \"openai\" or \"hash\")"
        )),
    }
}

fn open_index(config: &Config) -> Result<Arc<FlatIndex>> {
    let index = Arc::new(FlatIndex::new(&config.store_dir)?);

    // The existence check lives here, outside the engine: the index itself
    // never guesses whether a prior run left artifacts behind.
    if index.artifacts_exist() {
        index.load()?;
    }
    Ok(index)
}

fn build_pipeline(config: &Config) -> Result<RetrievalPipeline> {
    let chunker = Chunker::new(ChunkerConfig {
        chunk_size: config.chunk_size,
        overlap: config.overlap,
        ..ChunkerConfig::default()
    })?;
    let embedder = build_embedder(config)?;
    let index = open_index(config)?;

    Ok(RetrievalPipeline::new(
        chunker,
        embedder,
        index,
        RetrievalConfig {
            top_k: config.top_k,
        },
    ))
}
