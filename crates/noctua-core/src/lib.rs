//! # Noctua Core
//!
//! Shared foundations for the Noctua retrieval engine: the error taxonomy
//! and the `Result` alias used across the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::{Error, Result};
