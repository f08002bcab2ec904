//! HTTP/JSON API server for qlscout exploration runs.
//!
//! Accepts run requests, drives each run in a background task through the
//! exploration engine (or a `qlscout explore` child process), and serves
//! status, logs, results and artifacts. This crate contains the run
//! registry, settings, error handling and route definitions.

pub mod error;
pub mod handlers;
pub mod router;
pub mod runner;
pub mod runs;
pub mod schema;
pub mod settings;
pub mod state;
pub mod validation;

// Re-export commonly used types
pub use error::ApiError;
pub use runner::{GeneratorSource, ProviderGenerators, RunContext, RunLauncher};
pub use runs::{RunConfig, RunError, RunMode, RunRegistry, RunStatus};
pub use settings::Settings;
pub use state::AppState;
