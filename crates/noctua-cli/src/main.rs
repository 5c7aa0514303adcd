//! # Noctua CLI
//!
//! Command-line orchestrator for the Noctua retrieval engine: loads
//! documents, drives ingest and query, and renders ranked sources.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

mod commands;
mod config;
mod logging;

#[derive(Parser)]
#[command(name = "noctua")]
#[command(version)]
#[command(about = "Document retrieval over an exact vector index", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents into the index
    Ingest {
        /// Files to ingest (read as UTF-8 text)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Query the index for relevant chunks
    Query {
        /// The query text
        query: String,

        /// Number of matches to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show index status
    Stats,

    /// Discard the index and its persisted artifacts
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.json_logs);

    let config = config::Config::load();

    match cli.command {
        Commands::Ingest { paths } => commands::ingest(&config, &paths).await,
        Commands::Query { query, top_k } => commands::query(&config, &query, top_k).await,
        Commands::Stats => commands::stats(&config),
        Commands::Clear => commands::clear(&config),
    }
}
