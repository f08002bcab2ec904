//! Error types for the exploration engine and its seams.

use qlscout_core::CoreError;
use thiserror::Error;

/// Errors that end an exploration pass.
///
/// Per-candidate problems (generator failures, transport errors, bad
/// responses) never surface here; they are logged and scored 0.
#[derive(Debug, Error)]
pub enum ExploreError {
    /// A cancellation request was observed at a safe point.
    #[error("exploration cancelled")]
    Cancelled,

    /// The target's schema could not be obtained or exposes no operations.
    #[error("introspection failed: {0}")]
    Introspection(String),

    /// The target client could not be built or reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid engine or target configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An artifact could not be read or written.
    #[error("i/o error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The similarity index failed.
    #[error("similarity index error: {0}")]
    Index(String),

    /// The LLM provider settings are unusable.
    #[error(transparent)]
    Provider(#[from] GenerateError),
}

impl ExploreError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        ExploreError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<CoreError> for ExploreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ArtifactIo { path, source } => ExploreError::Io { path, source },
            CoreError::Serialization(inner) => ExploreError::Serialization(inner),
        }
    }
}

/// Failures of the text-generation seam.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    #[error("unsupported llm provider '{0}': use ollama, openai_compatible or gemini")]
    UnknownProvider(String),

    #[error("apiKey required for {provider}")]
    MissingApiKey { provider: String },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider request failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("provider response parse failed: {0}")]
    Parse(String),

    #[error("provider response missing content")]
    Empty,
}
