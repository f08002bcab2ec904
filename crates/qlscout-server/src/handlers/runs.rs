//! Run lifecycle handlers (create, status, logs, results, cancel, artifacts).

use std::path::Path as FsPath;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use qlscout_explore::pipeline::{
    COVERAGE_FILE, COVERAGE_REPORT_FILE, INTROSPECTION_FILE, STATS_TABLE_FILE,
};
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::runs::{LogsPage, RunConfig, RunRecord, RunStatusView, LOGS_FILE, RESULTS_FILE, SUMMARY_FILE};
use crate::schema::runs::{Artifact, CancelResponse, CreateRunResponse, LogsQuery, ResultsResponse};
use crate::state::AppState;
use crate::validation::validate_run_config;

/// Files listed by the results endpoint when present, in display order.
const LISTED_ARTIFACTS: [&str; 7] = [
    SUMMARY_FILE,
    RESULTS_FILE,
    STATS_TABLE_FILE,
    COVERAGE_REPORT_FILE,
    LOGS_FILE,
    COVERAGE_FILE,
    INTROSPECTION_FILE,
];

/// Validates a run config, registers the run and starts its task.
///
/// `POST /api/runs`
pub async fn create_run(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CreateRunResponse>, ApiError> {
    let config: RunConfig = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid run config: {e}")))?;
    validate_run_config(&config, &state.settings)?;

    let record = state.registry.create_run(&config).await?;
    info!(run_id = %record.run_id, endpoint = %config.endpoint_url, "run accepted");
    state
        .launcher
        .start(state.run_context(), record.run_id.clone(), config);

    Ok(Json(CreateRunResponse {
        run_id: record.run_id,
        status: record.status,
    }))
}

/// `GET /api/runs/{id}`
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunStatusView>, ApiError> {
    state
        .registry
        .get_status(&id)
        .await
        .map(Json)
        .ok_or_else(|| run_not_found(&id))
}

/// Log lines from `cursor` on.
///
/// `GET /api/runs/{id}/logs?cursor=N`
pub async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsPage>, ApiError> {
    state
        .registry
        .get_logs(&id, query.cursor)
        .await
        .map(Json)
        .ok_or_else(|| run_not_found(&id))
}

/// `GET /api/runs/{id}/results`
pub async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let record = lookup(&state, &id).await?;
    if !record.results_path.exists() {
        return Err(ApiError::NotFound("results not ready".to_string()));
    }

    let raw_json = read_json(&record.results_path).await?;
    let summary = if record.summary_path.exists() {
        read_json(&record.summary_path).await?
    } else {
        Value::Null
    };

    Ok(Json(ResultsResponse {
        summary,
        raw_json,
        artifacts: list_artifacts(&record),
    }))
}

/// Sets the cancel flag. The run task performs the transition.
///
/// `POST /api/runs/{id}/cancel`
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let status = state.registry.request_cancel(&id).await?;
    info!(run_id = %id, %status, "cancellation requested");
    Ok(Json(CancelResponse { status }))
}

/// Serves one file from the run directory.
///
/// `GET /api/runs/{id}/artifacts/{name}`
pub async fn get_artifact(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let record = lookup(&state, &id).await?;
    check_artifact_name(&name)?;

    let candidate = record.run_dir.join(&name);
    if !candidate.is_file() {
        return Err(ApiError::NotFound(format!("artifact {name} not found")));
    }
    let root = canonical(&record.run_dir).await?;
    let resolved = canonical(&candidate).await?;
    if !resolved.starts_with(&root) {
        return Err(ApiError::BadRequest(format!(
            "artifact {name} is outside the run directory"
        )));
    }

    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to read {name}: {e}")))?;
    Ok(([(header::CONTENT_TYPE, content_type(&name))], bytes).into_response())
}

async fn lookup(state: &AppState, id: &str) -> Result<RunRecord, ApiError> {
    state
        .registry
        .get_record(id)
        .await
        .ok_or_else(|| run_not_found(id))
}

fn run_not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("run {id} not found"))
}

/// Artifact names are plain file names inside the run directory.
pub fn check_artifact_name(name: &str) -> Result<(), ApiError> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && name != ".";
    if plain {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("invalid artifact name: {name}")))
    }
}

fn list_artifacts(record: &RunRecord) -> Vec<Artifact> {
    LISTED_ARTIFACTS
        .iter()
        .filter(|name| record.run_dir.join(name).is_file())
        .map(|name| Artifact {
            name: name.to_string(),
            url: format!("/api/runs/{}/artifacts/{}", record.run_id, name),
        })
        .collect()
}

fn content_type(name: &str) -> &'static str {
    match FsPath::new(name).extension().and_then(|ext| ext.to_str()) {
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn canonical(path: &FsPath) -> Result<std::path::PathBuf, ApiError> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to resolve {}: {e}", path.display())))
}

async fn read_json(path: &FsPath) -> Result<Value, ApiError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| ApiError::InternalError(format!("corrupt {}: {e}", path.display())))
}
