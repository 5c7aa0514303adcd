//! Configuration for the Noctua CLI.
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables (NOCTUA_*, nested keys split on "__")
//! 2. Config file (~/.config/noctua/config.toml)
//! 3. Default values

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the persisted index artifacts.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Default number of matches returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding backend settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Embedding backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend kind: "openai" (OpenAI-compatible HTTP) or "hash" (offline).
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Embedding model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding dimension produced by the model.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// API key for the HTTP backend. Prefer setting
    /// NOCTUA_EMBEDDING__API_KEY over writing it to the config file.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("noctua_store")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimension() -> usize {
    1536
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            top_k: default_top_k(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            dimension: default_dimension(),
            api_key: None,
        }
    }
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// Reports configuration errors clearly but falls back to defaults.
    pub fn load() -> Self {
        let config_path = Self::config_path();

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("NOCTUA_").split("__"));

        match figment.extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("\x1b[33mWarning:\x1b[0m Configuration error, using defaults");
                eprintln!("  Config file: {}", config_path.display());
                eprintln!("  Error: {e}");
                Config::default()
            }
        }
    }

    /// Returns the path to the config file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("noctua")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();
        assert!(config.overlap < config.chunk_size);
        assert!(config.top_k > 0);
        assert_eq!(config.embedding.provider, "openai");
        assert!(config.embedding.api_key.is_none());
    }
}
