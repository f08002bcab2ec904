//! Per-operation execution history.
//!
//! Every executed candidate becomes an [`ExecutionResult`]. Results are kept
//! per operation, fed back into prompts as previous request/response pairs,
//! harvested for known values, and persisted as `operations/<op>.json` inside
//! the run's artifact directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use qlscout_core::query_text::{extract_operation_name, field_inventory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExploreError;
use crate::target::Execution;

/// The liveness retry sent after an empty response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackProbe {
    pub query: String,
    pub http_status: Option<u16>,
    pub response_body: Value,
}

/// One executed candidate and its judged outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub query: String,
    pub http_status: Option<u16>,
    pub response_body: Value,
    pub success: bool,
    /// Every field name the query selects.
    pub field_paths: Vec<String>,
    /// Dotted parent/child selection paths.
    pub edge_paths: Vec<String>,
    pub operation_name_parsed: Option<String>,
    pub arm: String,
    pub round: u32,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_probe: Option<FallbackProbe>,
}

impl ExecutionResult {
    pub fn new(query: &str, arm: &str, round: u32, execution: Execution) -> Self {
        let inventory = field_inventory(query);
        let success =
            qlscout_core::is_successful_response(execution.status, &execution.body);
        ExecutionResult {
            query: query.to_string(),
            http_status: execution.status,
            response_body: execution.body,
            success,
            field_paths: inventory.fields.into_iter().collect(),
            edge_paths: inventory.edges.into_iter().collect(),
            operation_name_parsed: extract_operation_name(query),
            arm: arm.to_string(),
            round,
            elapsed_ms: execution.elapsed_ms,
            timestamp: Utc::now(),
            fallback_probe: execution.fallback,
        }
    }

    fn same_exchange(&self, other: &ExecutionResult) -> bool {
        self.query == other.query
            && self.http_status == other.http_status
            && self.response_body == other.response_body
    }
}

/// Execution results for every operation of one run.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    dir: Option<PathBuf>,
    entries: IndexMap<String, Vec<ExecutionResult>>,
}

impl ExecutionLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the history directory, creating it if needed and loading any
    /// `<op>.json` files already there.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ExploreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ExploreError::io(&dir, e))?;

        let mut entries = IndexMap::new();
        let listing = fs::read_dir(&dir).map_err(|e| ExploreError::io(&dir, e))?;
        let mut files: Vec<PathBuf> = listing
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let Some(op) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path).map_err(|e| ExploreError::io(&path, e))?;
            if raw.trim().is_empty() {
                continue;
            }
            let results: Vec<ExecutionResult> = serde_json::from_str(&raw)?;
            entries.insert(op.to_string(), results);
        }

        Ok(ExecutionLog {
            dir: Some(dir),
            entries,
        })
    }

    /// Appends `result` unless an identical exchange is already recorded.
    ///
    /// Returns whether it was appended. The in-memory log is updated before
    /// the file is written, so an `Err` only reports a failed write.
    pub fn record(&mut self, op: &str, result: ExecutionResult) -> Result<bool, ExploreError> {
        let results = self.entries.entry(op.to_string()).or_default();
        if results.iter().any(|r| r.same_exchange(&result)) {
            return Ok(false);
        }
        results.push(result);
        self.persist(op)?;
        Ok(true)
    }

    pub fn entries(&self, op: &str) -> &[ExecutionResult] {
        self.entries.get(op).map(Vec::as_slice).unwrap_or_default()
    }

    /// The last `limit` results for `op`, oldest first.
    pub fn recent(&self, op: &str, limit: usize) -> &[ExecutionResult] {
        let all = self.entries(op);
        &all[all.len().saturating_sub(limit)..]
    }

    pub fn operations(&self) -> impl Iterator<Item = (&str, &[ExecutionResult])> {
        self.entries
            .iter()
            .map(|(op, results)| (op.as_str(), results.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn persist(&self, op: &str) -> Result<(), ExploreError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.json", file_stem(op)));
        let json = serde_json::to_string_pretty(self.entries(op))?;
        fs::write(&path, json).map_err(|e| ExploreError::io(&path, e))
    }
}

fn file_stem(op: &str) -> String {
    op.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn execution(status: Option<u16>, body: Value) -> Execution {
        Execution {
            status,
            body,
            elapsed_ms: 3,
            fallback: None,
        }
    }

    #[test]
    fn result_is_judged_and_inventoried() {
        let result = ExecutionResult::new(
            "query GetFilm { film(id: 1) { title director { name } } }",
            "schema_min_known",
            1,
            execution(Some(200), json!({ "data": { "film": { "title": "A New Hope" } } })),
        );
        assert!(result.success);
        assert_eq!(result.operation_name_parsed.as_deref(), Some("GetFilm"));
        assert!(result.field_paths.contains(&"name".to_string()));
        assert!(result.edge_paths.contains(&"film.director.name".to_string()));
    }

    #[test]
    fn identical_exchanges_are_recorded_once() {
        let mut log = ExecutionLog::in_memory();
        let body = json!({ "data": { "film": null } });
        let first = ExecutionResult::new("{ film { id } }", "a", 1, execution(Some(200), body.clone()));
        let again = ExecutionResult::new("{ film { id } }", "b", 2, execution(Some(200), body));
        assert!(log.record("film", first).unwrap());
        assert!(!log.record("film", again).unwrap());
        assert_eq!(log.entries("film").len(), 1);
        assert!(log.entries("people").is_empty());
    }

    #[test]
    fn recent_keeps_newest() {
        let mut log = ExecutionLog::in_memory();
        for i in 0..5 {
            let query = format!("{{ film(id: {i}) {{ id }} }}");
            let result = ExecutionResult::new(&query, "a", 1, execution(None, json!({ "error": "down" })));
            log.record("film", result).unwrap();
        }
        let recent = log.recent("film", 2);
        assert_eq!(recent.len(), 2);
        assert!(recent[1].query.contains("id: 4"));
        assert_eq!(log.recent("film", 50).len(), 5);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn persists_and_reloads_per_operation_files() {
        let dir = tempfile::tempdir().unwrap();
        let ops_dir = dir.path().join("operations");

        let mut log = ExecutionLog::open(&ops_dir).unwrap();
        let result = ExecutionResult::new(
            "{ film { id } }",
            "a",
            1,
            execution(Some(200), json!({ "data": { "film": { "id": "1" } } })),
        );
        log.record("film", result).unwrap();
        assert!(ops_dir.join("film.json").exists());

        let reopened = ExecutionLog::open(&ops_dir).unwrap();
        assert_eq!(reopened.entries("film").len(), 1);
        assert!(reopened.entries("film")[0].success);
    }
}
