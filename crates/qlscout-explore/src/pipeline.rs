//! One complete exploration pass: introspect, build the schema graph, run the
//! rounds, and report.
//!
//! Both the server's run task and the `qlscout explore` command drive this.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use qlscout_core::{CoverageTracker, OperationSource, SchemaGraph};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::bandit::ThompsonSampler;
use crate::engine::{ExplorationState, Explorer, ExplorerConfig, ProgressWindow};
use crate::error::ExploreError;
use crate::history::ExecutionLog;
use crate::observer::ExplorationObserver;
use crate::providers::TextGenerator;
use crate::report::{render_coverage_report, render_stats_table, CoverageReport, RoundStats, StatsTable};
use crate::retrieval::SimilarityIndex;
use crate::target::GraphQlTarget;

pub const INTROSPECTION_FILE: &str = "introspection.json";
pub const COVERAGE_FILE: &str = "coverage_state.json";
pub const OPERATIONS_DIR: &str = "operations";
pub const STATS_TABLE_FILE: &str = "summary.txt";
pub const SUMMARY_FILE: &str = "summary.json";
pub const RESULTS_FILE: &str = "results.json";
pub const COVERAGE_REPORT_FILE: &str = "coverage_report.txt";

/// Share of the progress bar spent before the first round.
const ROUNDS_START: f64 = 0.15;
/// Share of the progress bar at which saving begins.
const ROUNDS_END: f64 = 0.9;

/// What to explore and where to keep the artifacts.
#[derive(Debug, Clone)]
pub struct ExplorationRequest {
    pub endpoint_url: String,
    pub headers: IndexMap<String, String>,
    pub rounds: u32,
    pub requests_per_node: u32,
    /// Makes arm selection reproducible.
    pub seed: Option<u64>,
    pub artifact_dir: PathBuf,
}

impl ExplorationRequest {
    pub fn new(endpoint_url: impl Into<String>, artifact_dir: impl Into<PathBuf>) -> Self {
        ExplorationRequest {
            endpoint_url: endpoint_url.into(),
            headers: IndexMap::new(),
            rounds: 2,
            requests_per_node: 2,
            seed: None,
            artifact_dir: artifact_dir.into(),
        }
    }
}

/// Results of a finished pass.
#[derive(Debug, Clone, Serialize)]
pub struct ExplorationOutcome {
    /// Compact overview, persisted as `summary.json`.
    pub summary: Value,
    /// Everything the pass produced, persisted as `results.json`.
    pub raw: Value,
    #[serde(skip)]
    pub report: CoverageReport,
    #[serde(skip)]
    pub stats: StatsTable,
}

impl ExplorationOutcome {
    /// Writes `summary.json`, `results.json` and the coverage report into
    /// `dir`.
    pub fn write_artifacts(&self, dir: &Path) -> Result<(), ExploreError> {
        fs::create_dir_all(dir).map_err(|e| ExploreError::io(dir, e))?;
        write_coverage_report(dir, &self.report)?;
        write_json(&dir.join(SUMMARY_FILE), &self.summary)?;
        write_json(&dir.join(RESULTS_FILE), &self.raw)
    }
}

/// Runs the whole pass described by `request`.
///
/// Returns [`ExploreError::Cancelled`] as soon as the observer reports a
/// cancellation at a round, operation, or iteration boundary.
pub async fn run_exploration(
    request: &ExplorationRequest,
    config: &ExplorerConfig,
    generator: Arc<dyn TextGenerator>,
    index: Arc<dyn SimilarityIndex>,
    observer: Arc<dyn ExplorationObserver>,
) -> Result<ExplorationOutcome, ExploreError> {
    if request.rounds == 0 || request.requests_per_node == 0 {
        return Err(ExploreError::Config(
            "rounds and requests per node must be at least 1".to_string(),
        ));
    }
    let dir = request.artifact_dir.as_path();
    fs::create_dir_all(dir).map_err(|e| ExploreError::io(dir, e))?;

    observer
        .progress(0.02, "initializing", Some("introspecting target".to_string()))
        .await;
    let target = GraphQlTarget::new(
        &request.endpoint_url,
        &request.headers,
        config.request_timeout,
        config.fallback_query.clone(),
    )?;
    if observer.is_cancelled().await {
        return Err(ExploreError::Cancelled);
    }

    let introspection = target.introspect().await?;
    write_json(&dir.join(INTROSPECTION_FILE), &introspection)?;
    let graph = SchemaGraph::from_introspection(&introspection);
    if graph.is_empty() {
        return Err(ExploreError::Introspection(
            "schema exposes no query or mutation operations".to_string(),
        ));
    }

    let (queries, mutations) = count_sources(&graph);
    info!(
        endpoint = %request.endpoint_url,
        queries,
        mutations,
        types = graph.objects.len(),
        "schema graph built"
    );
    observer
        .log(format!(
            "Introspection found {} operations ({queries} queries, {mutations} mutations) over {} object types",
            graph.operations.len(),
            graph.objects.len()
        ))
        .await;

    let mut state = ExplorationState::new(
        ThompsonSampler::new(request.seed, config.gamma),
        CoverageTracker::open(dir.join(COVERAGE_FILE))?,
        ExecutionLog::open(dir.join(OPERATIONS_DIR))?,
    );
    let explorer = Explorer::new(config.clone(), target, generator, index, observer.clone());
    if !state.history.is_empty() {
        explorer.refresh_index(&graph, &state.history).await;
    }

    let rounds = request.rounds;
    let round_width = (ROUNDS_END - ROUNDS_START) / f64::from(rounds);
    let mut table = StatsTable::default();
    let mut round_stats: Vec<RoundStats> = Vec::new();
    for round in 1..=rounds {
        let window = ProgressWindow::new(
            ROUNDS_START + round_width * f64::from(round - 1),
            round_width,
        );
        let stats = explorer
            .run_round(&graph, &mut state, round, request.requests_per_node, window)
            .await?;
        table.merge_round(&stats);
        round_stats.push(stats);

        let rendered = render_stats_table(&table);
        let table_path = dir.join(STATS_TABLE_FILE);
        fs::write(&table_path, format!("{rendered}\n")).map_err(|e| ExploreError::io(&table_path, e))?;
        observer.log(format!("Round {round}/{rounds} complete\n{rendered}")).await;

        let harvested = explorer.refresh_index(&graph, &state.history).await;
        info!(round, known_values = harvested, "round complete");
    }

    observer
        .progress(ROUNDS_END, "saving", Some("writing results".to_string()))
        .await;
    let report = CoverageReport::build(&graph, &state.history);
    write_coverage_report(dir, &report)?;
    let summary = summary_json(request, &graph, &table, &report);
    let raw = raw_json(request, &graph, &state, &round_stats, &table, &report)?;
    observer
        .log(format!(
            "Covered {}/{} operations with {} requests ({:.1}% successful, {:.1}% field coverage)",
            report.covered_operations,
            report.total_operations,
            table.total_requests(),
            report.success_rate,
            report.field_coverage
        ))
        .await;

    Ok(ExplorationOutcome {
        summary,
        raw,
        report,
        stats: table,
    })
}

fn count_sources(graph: &SchemaGraph) -> (usize, usize) {
    let queries = graph
        .operations
        .values()
        .filter(|op| op.source == OperationSource::Query)
        .count();
    (queries, graph.operations.len() - queries)
}

fn summary_json(
    request: &ExplorationRequest,
    graph: &SchemaGraph,
    table: &StatsTable,
    report: &CoverageReport,
) -> Value {
    let (queries, mutations) = count_sources(graph);
    json!({
        "endpoint": request.endpoint_url,
        "rounds": request.rounds,
        "requestsPerNode": request.requests_per_node,
        "operations": graph.operations.len(),
        "queries": queries,
        "mutations": mutations,
        "coveredOperations": report.covered_operations,
        "coverageRatio": report.coverage_ratio,
        "successRate": report.success_rate,
        "fieldCoverage": report.field_coverage,
        "edgeCoverage": report.edge_coverage,
        "totalRequests": table.total_requests(),
        "totalTokenEstimate": table.total_tokens(),
        "statsTable": render_stats_table(table),
    })
}

fn raw_json(
    request: &ExplorationRequest,
    graph: &SchemaGraph,
    state: &ExplorationState,
    round_stats: &[RoundStats],
    table: &StatsTable,
    report: &CoverageReport,
) -> Result<Value, ExploreError> {
    let operations: Vec<Value> = graph
        .operations
        .values()
        .map(|op| {
            json!({
                "name": op.name,
                "source": op.source,
                "inputs": op.input_signatures,
                "output": op.output_signature,
                "nodeType": op.terminal_node_type,
            })
        })
        .collect();

    let mut coverage = serde_json::Map::new();
    let mut executions = serde_json::Map::new();
    for name in graph.operation_names() {
        let paths = state.coverage.paths(name).cloned().unwrap_or_default();
        coverage.insert(name.to_string(), serde_json::to_value(paths)?);
        executions.insert(name.to_string(), serde_json::to_value(state.history.entries(name))?);
    }

    Ok(json!({
        "endpoint": request.endpoint_url,
        "seed": request.seed,
        "schema": {
            "queryType": graph.query_type,
            "mutationType": graph.mutation_type,
            "objectTypes": graph.objects.len(),
            "typeGraphEdges": graph.type_graph().edge_count(),
            "operations": operations,
        },
        "roundStats": serde_json::to_value(round_stats)?,
        "stats": serde_json::to_value(table)?,
        "coverage": serde_json::to_value(report)?,
        "coveredPaths": coverage,
        "bandit": serde_json::to_value(state.bandit.snapshot())?,
        "executions": executions,
    }))
}

fn write_coverage_report(dir: &Path, report: &CoverageReport) -> Result<(), ExploreError> {
    let path = dir.join(COVERAGE_REPORT_FILE);
    fs::write(&path, render_coverage_report(report)).map_err(|e| ExploreError::io(&path, e))
}

fn write_json(path: &Path, value: &Value) -> Result<(), ExploreError> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|e| ExploreError::io(path, e))
}
