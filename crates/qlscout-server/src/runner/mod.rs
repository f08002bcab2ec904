//! Background run tasks.
//!
//! [`RunLauncher`] spawns one tokio task per accepted run and keeps its
//! handle until the task ends. The task drives the run to a terminal state:
//! `done` after results are saved, `cancelled` when the engine observes the
//! cancel flag, `failed` for anything else that escapes the pipeline.

pub mod subprocess;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use qlscout_explore::{
    build_generator, parse_headers_json, run_exploration, ExplorationObserver, ExplorationRequest, ExploreError,
    ExplorerConfig, KnownValueIndex, ProviderConfig, ProviderKind, TextGenerator,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::runs::{Progress, RunConfig, RunMode, RunRegistry, RunStatus, StatusUpdate};
use crate::settings::Settings;

/// Produces the text generator for a run.
pub trait GeneratorSource: Send + Sync {
    fn generator(
        &self,
        config: &RunConfig,
        settings: &Settings,
    ) -> Result<Arc<dyn TextGenerator>, ExploreError>;
}

/// Builds one of the bundled provider backends from the run config.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderGenerators;

impl GeneratorSource for ProviderGenerators {
    fn generator(
        &self,
        config: &RunConfig,
        settings: &Settings,
    ) -> Result<Arc<dyn TextGenerator>, ExploreError> {
        Ok(build_generator(&provider_config(config, settings)?)?)
    }
}

/// Maps a run config onto backend settings. Ollama falls back to the
/// server's default model; base URLs always come from the server settings.
pub fn provider_config(
    config: &RunConfig,
    settings: &Settings,
) -> Result<ProviderConfig, ExploreError> {
    let mut provider = ProviderConfig::resolve(
        &config.llm_provider,
        config.model.as_deref(),
        config.api_key.as_deref(),
        None,
    )?;
    let kind = provider.kind;
    if provider.model.is_empty() && kind == ProviderKind::Ollama {
        provider.model = settings.default_model.clone();
    }
    provider.base_url = Some(match kind {
        ProviderKind::Ollama => settings.ollama_base_url.clone(),
        ProviderKind::OpenaiCompatible => settings.openai_base_url.clone(),
        ProviderKind::Gemini => settings.gemini_base_url.clone(),
    });
    Ok(provider)
}

/// Everything a run task needs, cloned out of the application state.
#[derive(Clone)]
pub struct RunContext {
    pub registry: Arc<RunRegistry>,
    pub settings: Arc<Settings>,
    pub generators: Arc<dyn GeneratorSource>,
    pub explorer_config: Arc<ExplorerConfig>,
}

/// How a run task ended, before it is written to the registry.
#[derive(Debug)]
pub(crate) enum RunEnd {
    /// Results still to be stamped with the run's identity and saved.
    Done { summary: Value, raw: Value },
    /// Results are saved in the run directory.
    Saved,
    Cancelled,
    Failed(String),
}

pub struct RunLauncher {
    tasks: DashMap<String, JoinHandle<()>>,
}

impl Default for RunLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLauncher {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Spawns the task for `run_id`. A run already in flight is left alone.
    pub fn start(self: &Arc<Self>, ctx: RunContext, run_id: String, config: RunConfig) {
        if self.tasks.contains_key(&run_id) {
            return;
        }

        self.tasks.retain(|_, handle| !handle.is_finished());

        let launcher = Arc::clone(self);
        let key = run_id.clone();
        let handle = tokio::spawn(async move {
            execute_run(&ctx, &run_id, &config).await;
            launcher.tasks.remove(&run_id);
        });
        self.tasks.insert(key, handle);
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.tasks
            .get(run_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|h| !h.is_finished()).count()
    }
}

/// Runs one job to completion and records its terminal state. Never panics
/// and never returns an error: everything is reported through the registry.
pub async fn execute_run(ctx: &RunContext, run_id: &str, config: &RunConfig) {
    let registry = &ctx.registry;
    if let Err(err) = registry
        .update_status(run_id, StatusUpdate::status(RunStatus::Running))
        .await
    {
        warn!(run_id, error = %err, "run could not be started");
        return;
    }
    info!(run_id, mode = ?config.mode, endpoint = %config.endpoint_url, "run started");

    let end = match config.mode {
        RunMode::Engine => run_engine(ctx, run_id, config).await,
        RunMode::Subprocess => subprocess::run(ctx, run_id, config).await,
    };
    finish(ctx, run_id, config, end).await;
}

async fn run_engine(ctx: &RunContext, run_id: &str, config: &RunConfig) -> RunEnd {
    let headers = match parse_headers_json(config.graphql_headers_json.as_deref()) {
        Ok(headers) => headers,
        Err(err) => return RunEnd::Failed(err.to_string()),
    };
    let generator = match ctx.generators.generator(config, &ctx.settings) {
        Ok(generator) => generator,
        Err(err) => return RunEnd::Failed(err.to_string()),
    };
    let Some(record) = ctx.registry.get_record(run_id).await else {
        return RunEnd::Failed(format!("run {run_id} disappeared"));
    };

    let request = ExplorationRequest {
        endpoint_url: config.endpoint_url.clone(),
        headers,
        rounds: config.rounds,
        requests_per_node: config.requests_per_node,
        seed: config.seed,
        artifact_dir: record.run_dir,
    };
    let observer: Arc<dyn ExplorationObserver> = Arc::new(RegistryObserver {
        registry: Arc::clone(&ctx.registry),
        run_id: run_id.to_string(),
    });
    observer
        .log(format!(
            "Exploring {} with {} ({} rounds, {} requests per operation)",
            config.endpoint_url, config.llm_provider, config.rounds, config.requests_per_node
        ))
        .await;

    let outcome = run_exploration(
        &request,
        &ctx.explorer_config,
        generator,
        Arc::new(KnownValueIndex::new()),
        observer,
    )
    .await;

    match outcome {
        Ok(outcome) => RunEnd::Done {
            summary: outcome.summary,
            raw: outcome.raw,
        },
        Err(ExploreError::Cancelled) => RunEnd::Cancelled,
        Err(err) => RunEnd::Failed(err.to_string()),
    }
}

async fn finish(ctx: &RunContext, run_id: &str, config: &RunConfig, end: RunEnd) {
    let registry = &ctx.registry;
    let log = |line: String| async move {
        if let Err(err) = registry.append_log(run_id, &line).await {
            warn!(run_id, error = %err, "run log append failed");
        }
    };

    let end = match end {
        RunEnd::Done { mut summary, raw } => {
            if let Value::Object(map) = &mut summary {
                map.insert("runId".to_string(), Value::String(run_id.to_string()));
                map.insert(
                    "notes".to_string(),
                    config.notes.clone().map_or(Value::Null, Value::String),
                );
            }
            if let Err(err) = registry
                .update_status(
                    run_id,
                    StatusUpdate::progress(Progress::new(0.95, "saving", None)),
                )
                .await
            {
                warn!(run_id, error = %err, "saving progress not recorded");
            }
            match registry.save_results(run_id, &summary, &raw).await {
                Ok(()) => RunEnd::Saved,
                Err(err) => RunEnd::Failed(format!("saving results failed: {err}")),
            }
        }
        other => other,
    };

    let pct = registry
        .get_status(run_id)
        .await
        .map_or(0.0, |view| view.progress.pct);
    let update = match end {
        RunEnd::Done { .. } | RunEnd::Saved => {
            log("Run complete. Artifacts written.".to_string()).await;
            info!(run_id, "run done");
            StatusUpdate::status(RunStatus::Done).with_progress(Progress::new(1.0, "done", None))
        }
        RunEnd::Cancelled => {
            log("Run cancelled".to_string()).await;
            info!(run_id, "run cancelled");
            StatusUpdate::status(RunStatus::Cancelled)
                .with_progress(Progress::new(pct, "cancelled", None))
        }
        RunEnd::Failed(message) => {
            log(format!("Run failed: {message}")).await;
            error!(run_id, error = %message, "run failed");
            StatusUpdate::status(RunStatus::Failed)
                .with_progress(Progress::new(pct, "failed", None))
                .with_error(message)
        }
    };
    if let Err(err) = registry.update_status(run_id, update).await {
        warn!(run_id, error = %err, "terminal status not recorded");
    }
}

/// Bridges engine callbacks onto the run registry.
pub struct RegistryObserver {
    registry: Arc<RunRegistry>,
    run_id: String,
}

impl RegistryObserver {
    pub fn new(registry: Arc<RunRegistry>, run_id: impl Into<String>) -> Self {
        RegistryObserver {
            registry,
            run_id: run_id.into(),
        }
    }
}

#[async_trait]
impl ExplorationObserver for RegistryObserver {
    async fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled(&self.run_id).await
    }

    async fn log(&self, line: String) {
        if let Err(err) = self.registry.append_log(&self.run_id, &line).await {
            warn!(run_id = %self.run_id, error = %err, "run log append failed");
        }
    }

    async fn progress(&self, pct: f64, stage: &str, detail: Option<String>) {
        let update = StatusUpdate::progress(Progress::new(pct, stage, detail));
        if let Err(err) = self.registry.update_status(&self.run_id, update).await {
            warn!(run_id = %self.run_id, error = %err, "progress update rejected");
        }
    }
}
