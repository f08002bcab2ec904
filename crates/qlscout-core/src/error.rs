//! Core error types for qlscout-core.
//!
//! Schema building, text utilities, and success judgment are total and never
//! fail; only the coverage store touches disk.

use thiserror::Error;

/// Errors produced by the qlscout-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reading or writing a per-run artifact failed.
    #[error("artifact i/o error at '{path}': {source}")]
    ArtifactIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted artifact could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
