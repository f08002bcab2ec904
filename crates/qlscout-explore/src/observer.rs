//! Observation seam between the engine and whoever hosts it.
//!
//! The engine never knows whether it runs inside the HTTP server or the CLI.
//! It reports log lines and progress through this trait and asks it whether
//! cancellation was requested at every safe point.

use async_trait::async_trait;

#[async_trait]
pub trait ExplorationObserver: Send + Sync {
    /// Polled at round, operation, and iteration starts.
    async fn is_cancelled(&self) -> bool;

    /// A human-readable line for the run log.
    async fn log(&self, line: String);

    /// Overall progress in `[0, 1]` with a stage label.
    async fn progress(&self, pct: f64, stage: &str, detail: Option<String>);
}
