//! Run lifecycle registry.
//!
//! [`RunRegistry`] owns every run's record and log buffer behind a single
//! `tokio::sync::Mutex`. Every operation takes the gate for the duration of
//! its in-memory mutation (plus the small local file append it implies) and
//! never across a network call.
//!
//! # State machine
//!
//! `queued -> running -> {done | failed | cancelled}`. A terminal update on a
//! queued run passes through `running`, stamping `startedAt`. The first
//! terminal transition stamps `finishedAt`; any later update is rejected with
//! [`RunError::AlreadyFinished`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const LOGS_FILE: &str = "logs.txt";
pub const RESULTS_FILE: &str = qlscout_explore::pipeline::RESULTS_FILE;
pub const SUMMARY_FILE: &str = qlscout_explore::pipeline::SUMMARY_FILE;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run not found: {0}")]
    NotFound(String),

    #[error("run {run_id} already finished as {status}")]
    AlreadyFinished { run_id: String, status: RunStatus },

    #[error("i/o error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        RunError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Always within `[0, 1]`.
    pub pct: f64,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Progress {
    pub fn new(pct: f64, stage: impl Into<String>, detail: Option<String>) -> Self {
        let pct = if pct.is_finite() { pct.clamp(0.0, 1.0) } else { 0.0 };
        Progress {
            pct,
            stage: stage.into(),
            detail,
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::new(0.0, "queued", None)
    }
}

/// How a run's exploration is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// In-process, inside the server's runtime.
    #[default]
    Engine,
    /// A child `qlscout explore` process.
    Subprocess,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_rounds() -> u32 {
    2
}

/// Body of `POST /api/runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub endpoint_url: String,
    #[serde(default = "default_provider")]
    pub llm_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Never serialized, so config snapshots carry no secret.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql_headers_json: Option<String>,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_rounds")]
    pub requests_per_node: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        RunConfig {
            endpoint_url: endpoint_url.into(),
            llm_provider: default_provider(),
            model: None,
            api_key: None,
            graphql_headers_json: None,
            rounds: default_rounds(),
            requests_per_node: default_rounds(),
            notes: None,
            mode: RunMode::Engine,
            seed: None,
        }
    }

    /// The config as stored on the record: secrets excluded.
    pub fn snapshot(&self) -> Result<Value, RunError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub config: Value,
    pub run_dir: PathBuf,
    pub logs_path: PathBuf,
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
}

/// `GET /api/runs/{id}` view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusView {
    pub run_id: String,
    pub status: RunStatus,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&RunRecord> for RunStatusView {
    fn from(record: &RunRecord) -> Self {
        RunStatusView {
            run_id: record.run_id.clone(),
            status: record.status,
            progress: record.progress.clone(),
            started_at: record.started_at,
            finished_at: record.finished_at,
            error: record.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsPage {
    pub lines: Vec<String>,
    pub next_cursor: usize,
}

/// A partial update applied by [`RunRegistry::update_status`].
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<RunStatus>,
    pub progress: Option<Progress>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: RunStatus) -> Self {
        StatusUpdate {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: Progress) -> Self {
        StatusUpdate {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

struct RunEntry {
    record: RunRecord,
    logs: Vec<String>,
}

/// In-memory registry of every run known to this process.
pub struct RunRegistry {
    runs_dir: PathBuf,
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl RunRegistry {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Result<Self, RunError> {
        let runs_dir = runs_dir.into();
        fs::create_dir_all(&runs_dir).map_err(|e| RunError::io(&runs_dir, e))?;
        Ok(RunRegistry {
            runs_dir,
            runs: Mutex::new(HashMap::new()),
        })
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Registers a new queued run and creates its artifact directory.
    pub async fn create_run(&self, config: &RunConfig) -> Result<RunRecord, RunError> {
        let snapshot = config.snapshot()?;
        let mut runs = self.runs.lock().await;

        let mut run_id = Uuid::new_v4().simple().to_string();
        while runs.contains_key(&run_id) || self.runs_dir.join(&run_id).exists() {
            run_id = Uuid::new_v4().simple().to_string();
        }
        let run_dir = self.runs_dir.join(&run_id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| RunError::io(&run_dir, e))?;

        let record = RunRecord {
            run_id: run_id.clone(),
            status: RunStatus::Queued,
            progress: Progress::default(),
            started_at: None,
            finished_at: None,
            error: None,
            cancel_requested: false,
            config: snapshot,
            logs_path: run_dir.join(LOGS_FILE),
            results_path: run_dir.join(RESULTS_FILE),
            summary_path: run_dir.join(SUMMARY_FILE),
            run_dir,
        };
        runs.insert(
            run_id,
            RunEntry {
                record: record.clone(),
                logs: Vec::new(),
            },
        );
        Ok(record)
    }

    /// Appends one timestamped line per line of `message`, in memory and to
    /// `logs.txt`. Lines land on disk in the order they were accepted.
    pub async fn append_log(&self, run_id: &str, message: &str) -> Result<(), RunError> {
        let mut runs = self.runs.lock().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        push_log(entry, message).await
    }

    /// Applies `update`. See the module docs for the transition rules.
    pub async fn update_status(
        &self,
        run_id: &str,
        update: StatusUpdate,
    ) -> Result<RunStatusView, RunError> {
        let mut runs = self.runs.lock().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        let record = &mut entry.record;
        if record.status.is_terminal() {
            return Err(RunError::AlreadyFinished {
                run_id: run_id.to_string(),
                status: record.status,
            });
        }

        let now = Utc::now();
        if let Some(status) = update.status {
            // A run never moves back to queued.
            if status != RunStatus::Queued {
                if record.started_at.is_none() {
                    record.started_at = Some(now);
                }
                record.status = status;
                if status.is_terminal() {
                    record.finished_at = Some(now);
                }
            }
        }
        if let Some(progress) = update.progress {
            record.progress = Progress::new(progress.pct, progress.stage, progress.detail);
        }
        if let Some(error) = update.error {
            record.error = Some(error);
        }
        Ok(RunStatusView::from(&*record))
    }

    /// Flags the run for cooperative cancellation and logs the request.
    /// Returns the run's current status.
    pub async fn request_cancel(&self, run_id: &str) -> Result<RunStatus, RunError> {
        let mut runs = self.runs.lock().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        if !entry.record.status.is_terminal() && !entry.record.cancel_requested {
            entry.record.cancel_requested = true;
            push_log(entry, "Cancellation requested").await?;
        }
        Ok(entry.record.status)
    }

    pub async fn is_cancelled(&self, run_id: &str) -> bool {
        let runs = self.runs.lock().await;
        runs.get(run_id)
            .is_some_and(|entry| entry.record.cancel_requested)
    }

    /// Writes `summary.json` and `results.json` for the run.
    pub async fn save_results(
        &self,
        run_id: &str,
        summary: &Value,
        raw: &Value,
    ) -> Result<(), RunError> {
        let runs = self.runs.lock().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        let record = &entry.record;
        tokio::fs::create_dir_all(&record.run_dir)
            .await
            .map_err(|e| RunError::io(&record.run_dir, e))?;
        let summary_text = serde_json::to_string_pretty(summary)?;
        tokio::fs::write(&record.summary_path, summary_text)
            .await
            .map_err(|e| RunError::io(&record.summary_path, e))?;
        let raw_text = serde_json::to_string_pretty(raw)?;
        tokio::fs::write(&record.results_path, raw_text)
            .await
            .map_err(|e| RunError::io(&record.results_path, e))
    }

    pub async fn get_status(&self, run_id: &str) -> Option<RunStatusView> {
        let runs = self.runs.lock().await;
        runs.get(run_id).map(|entry| RunStatusView::from(&entry.record))
    }

    /// Lines at index `cursor` and beyond.
    pub async fn get_logs(&self, run_id: &str, cursor: usize) -> Option<LogsPage> {
        let runs = self.runs.lock().await;
        let entry = runs.get(run_id)?;
        let lines: Vec<String> = entry.logs.iter().skip(cursor).cloned().collect();
        Some(LogsPage {
            next_cursor: cursor + lines.len(),
            lines,
        })
    }

    pub async fn get_record(&self, run_id: &str) -> Option<RunRecord> {
        let runs = self.runs.lock().await;
        runs.get(run_id).map(|entry| entry.record.clone())
    }
}

async fn push_log(entry: &mut RunEntry, message: &str) -> Result<(), RunError> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let stamped: Vec<String> = message
        .lines()
        .map(|line| format!("[{timestamp}] {line}"))
        .collect();
    if stamped.is_empty() {
        return Ok(());
    }

    let mut text = stamped.join("\n");
    text.push('\n');
    let path = &entry.record.logs_path;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| RunError::io(path, e))?;
    file.write_all(text.as_bytes())
        .await
        .map_err(|e| RunError::io(path, e))?;
    file.flush().await.map_err(|e| RunError::io(path, e))?;
    entry.logs.extend(stamped);
    Ok(())
}
