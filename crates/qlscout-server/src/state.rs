//! Application state shared by every handler.
//!
//! [`AppState`] is cheap to clone: all fields are `Arc`s. The run registry
//! guards its own map with an async mutex, and the launcher keeps task
//! handles in a `DashMap`, so handlers never hold a lock across an await
//! of their own.

use std::sync::Arc;

use qlscout_explore::ExplorerConfig;

use crate::error::ApiError;
use crate::runner::{GeneratorSource, ProviderGenerators, RunContext, RunLauncher};
use crate::runs::RunRegistry;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Run records, logs and results.
    pub registry: Arc<RunRegistry>,
    /// Background task per accepted run.
    pub launcher: Arc<RunLauncher>,
    /// Builds the LLM backend for each run.
    pub generators: Arc<dyn GeneratorSource>,
    pub explorer_config: Arc<ExplorerConfig>,
}

impl AppState {
    /// Creates state whose runs live under `settings.runs_dir`.
    pub fn new(settings: Settings) -> Result<Self, ApiError> {
        Self::with_generators(settings, Arc::new(ProviderGenerators))
    }

    /// Same as [`AppState::new`] with a custom generator source.
    pub fn with_generators(
        settings: Settings,
        generators: Arc<dyn GeneratorSource>,
    ) -> Result<Self, ApiError> {
        let registry = RunRegistry::new(&settings.runs_dir)?;
        Ok(AppState {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            launcher: Arc::new(RunLauncher::new()),
            generators,
            explorer_config: Arc::new(ExplorerConfig::default()),
        })
    }

    /// Creates state with a fresh runs directory under the system temp dir
    /// (for testing).
    pub fn in_memory() -> Result<Self, ApiError> {
        let settings = Settings {
            runs_dir: std::env::temp_dir()
                .join(format!("qlscout-runs-{}", uuid::Uuid::new_v4().simple())),
            ..Settings::default()
        };
        Self::new(settings)
    }

    /// The slice of state a run task carries.
    pub fn run_context(&self) -> RunContext {
        RunContext {
            registry: Arc::clone(&self.registry),
            settings: Arc::clone(&self.settings),
            generators: Arc::clone(&self.generators),
            explorer_config: Arc::clone(&self.explorer_config),
        }
    }
}
