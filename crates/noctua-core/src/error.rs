//! Error types for the Noctua retrieval engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Noctua workspace.
///
/// The engine never catches-and-continues past one of these; each is
/// surfaced to the orchestrating layer, which decides the user-facing
/// behavior.
#[derive(Error, Debug)]
pub enum Error {
    /// Empty or otherwise invalid input. Never retried.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// A vector's length disagrees with the index's locked dimension.
    ///
    /// Fatal for the offending operation; prior entries are untouched.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension locked by the first insertion.
        expected: usize,
        /// The length of the offending vector.
        actual: usize,
    },

    /// Persistence failure: a missing artifact or an I/O or
    /// (de)serialization error on save/load.
    #[error("Storage error at {}: {message}", path.display())]
    Storage {
        /// The path involved in the failure.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Embedding-backend invocation failure, wrapped with context.
    #[error("Upstream embedding error: {message}")]
    Upstream {
        /// Description of the backend failure.
        message: String,
    },
}

impl Error {
    /// Creates a validation error with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a storage error for the given path.
    #[must_use]
    pub fn storage(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates an upstream error with the given message.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Returns `true` if this error came from invalid caller input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
