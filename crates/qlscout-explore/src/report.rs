//! Round statistics and coverage reporting.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use indexmap::IndexMap;
use qlscout_core::query_text::field_inventory;
use qlscout_core::{schema_field_paths, SchemaGraph};
use serde::Serialize;

use crate::history::ExecutionLog;

/// What one operation did in one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    /// Cumulative requests charged to the operation so far in the run.
    pub requests: u32,
    pub token_estimate: f64,
    /// Whether any execution succeeded.
    pub succeeded: bool,
}

pub type RoundStats = IndexMap<String, OperationStats>;

/// Cross-round aggregate: `requests` and `succeeded` follow the latest round,
/// token estimates accumulate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StatsTable {
    rows: IndexMap<String, OperationStats>,
}

impl StatsTable {
    pub fn merge_round(&mut self, round: &RoundStats) {
        for (op, stats) in round {
            let row = self.rows.entry(op.clone()).or_default();
            row.requests = stats.requests;
            row.succeeded = stats.succeeded;
            row.token_estimate += stats.token_estimate;
        }
    }

    pub fn rows(&self) -> &IndexMap<String, OperationStats> {
        &self.rows
    }

    pub fn get(&self, op: &str) -> Option<&OperationStats> {
        self.rows.get(op)
    }

    pub fn total_requests(&self) -> u32 {
        self.rows.values().map(|r| r.requests).sum()
    }

    pub fn total_tokens(&self) -> f64 {
        self.rows.values().map(|r| r.token_estimate).sum()
    }
}

/// Renders `table` as a grid text table
/// (`Operation | Requests | Tokens | Succeeded`).
pub fn render_stats_table(table: &StatsTable) -> String {
    let headers = ["Operation", "Requests", "Tokens", "Succeeded"];
    let body: Vec<[String; 4]> = table
        .rows
        .iter()
        .map(|(op, row)| {
            [
                op.clone(),
                row.requests.to_string(),
                group_thousands(row.token_estimate.round() as u64),
                row.succeeded.to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = |fill: char| {
        let mut line = String::from("+");
        for width in widths {
            line.extend(std::iter::repeat(fill).take(width + 2));
            line.push('+');
        }
        line
    };
    let render_row = |cells: [&str; 4]| {
        let mut line = String::from("|");
        for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
            // Numeric columns are right-aligned.
            if i == 1 || i == 2 {
                line.push_str(&format!(" {cell:>width$} |"));
            } else {
                line.push_str(&format!(" {cell:<width$} |"));
            }
        }
        line
    };

    let mut lines = vec![rule('-'), render_row(headers), rule('=')];
    for row in &body {
        lines.push(render_row([&row[0], &row[1], &row[2], &row[3]]));
        lines.push(rule('-'));
    }
    if body.is_empty() {
        lines.push(rule('-'));
    }
    lines.join("\n")
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Coverage of one operation at the end of a run.
///
/// Fields are bare field names of the types reachable from the operation's
/// output; edges are the dotted `op.field...` paths through them. Every
/// percentage is in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationCoverage {
    pub operation: String,
    pub source: String,
    pub requests: usize,
    pub successes: usize,
    pub covered: bool,
    pub success_rate: f64,
    pub schema_fields: usize,
    pub attempted_fields: usize,
    pub succeeded_fields: usize,
    /// Edges reachable through the relevant schema.
    pub schema_edges: usize,
    pub attempted_edges: usize,
    pub succeeded_edges: usize,
    pub attempted_field_coverage: f64,
    pub succeeded_field_coverage: f64,
    pub attempted_edge_coverage: f64,
    pub succeeded_edge_coverage: f64,
    /// Succeeded field coverage weighted by the success rate.
    pub field_quality_index: f64,
    pub edge_quality_index: f64,
    /// Mean of the two quality indices.
    pub composite_quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub operations: Vec<OperationCoverage>,
    pub total_operations: usize,
    pub covered_operations: usize,
    /// Covered operations over all operations.
    pub coverage_ratio: f64,
    pub total_requests: usize,
    pub total_successes: usize,
    pub success_rate: f64,
    /// Succeeded fields over schema fields, summed across operations.
    pub field_coverage: f64,
    pub edge_coverage: f64,
}

#[derive(Default)]
struct Attempts {
    fields: BTreeSet<String>,
    edges: BTreeSet<String>,
}

impl CoverageReport {
    pub fn build(graph: &SchemaGraph, log: &ExecutionLog) -> Self {
        let mut operations = Vec::new();
        for op in graph.operations.values() {
            let schema_edges = schema_field_paths(op);
            let schema_fields: BTreeSet<String> = schema_edges
                .iter()
                .filter_map(|path| path.rsplit('.').next())
                .map(str::to_string)
                .collect();
            let results = log.entries(&op.name);

            let mut attempted = Attempts::default();
            let mut succeeded = Attempts::default();
            for result in results {
                let inventory = field_inventory(&result.query);
                let fields: Vec<&String> = inventory
                    .fields
                    .iter()
                    .filter(|f| schema_fields.contains(*f))
                    .collect();
                let edges: Vec<&String> = inventory
                    .edges
                    .iter()
                    .filter(|e| schema_edges.contains(*e))
                    .collect();
                if result.success {
                    succeeded.fields.extend(fields.iter().map(|f| (*f).clone()));
                    succeeded.edges.extend(edges.iter().map(|e| (*e).clone()));
                }
                attempted.fields.extend(fields.into_iter().cloned());
                attempted.edges.extend(edges.into_iter().cloned());
            }

            let requests = results.len();
            let successes = results.iter().filter(|r| r.success).count();
            let success_rate = percent(successes, requests);
            let succeeded_field_coverage = percent(succeeded.fields.len(), schema_fields.len());
            let succeeded_edge_coverage = percent(succeeded.edges.len(), schema_edges.len());
            let field_quality_index = succeeded_field_coverage * success_rate / 100.0;
            let edge_quality_index = succeeded_edge_coverage * success_rate / 100.0;

            operations.push(OperationCoverage {
                operation: op.name.clone(),
                source: op.source.to_string(),
                requests,
                successes,
                covered: successes > 0,
                success_rate,
                schema_fields: schema_fields.len(),
                attempted_fields: attempted.fields.len(),
                succeeded_fields: succeeded.fields.len(),
                schema_edges: schema_edges.len(),
                attempted_edges: attempted.edges.len(),
                succeeded_edges: succeeded.edges.len(),
                attempted_field_coverage: percent(attempted.fields.len(), schema_fields.len()),
                succeeded_field_coverage,
                attempted_edge_coverage: percent(attempted.edges.len(), schema_edges.len()),
                succeeded_edge_coverage,
                field_quality_index,
                edge_quality_index,
                composite_quality_score: (field_quality_index + edge_quality_index) / 2.0,
            });
        }

        let sum = |f: fn(&OperationCoverage) -> usize| operations.iter().map(f).sum::<usize>();
        let total_requests = sum(|o| o.requests);
        let total_successes = sum(|o| o.successes);
        let field_coverage = percent(sum(|o| o.succeeded_fields), sum(|o| o.schema_fields));
        let edge_coverage = percent(sum(|o| o.succeeded_edges), sum(|o| o.schema_edges));
        let total_operations = operations.len();
        let covered_operations = operations.iter().filter(|o| o.covered).count();
        CoverageReport {
            operations,
            total_operations,
            covered_operations,
            coverage_ratio: ratio(covered_operations, total_operations),
            total_requests,
            total_successes,
            success_rate: percent(total_successes, total_requests),
            field_coverage,
            edge_coverage,
        }
    }
}

/// Renders the per-operation coverage and quality report written as
/// `coverage_report.txt`.
pub fn render_coverage_report(report: &CoverageReport) -> String {
    let mut out = String::new();
    for op in &report.operations {
        let _ = writeln!(out, "================= {} ({}) =================", op.operation, op.source);
        let _ = writeln!(out, "Requests: {}", op.requests);
        let _ = writeln!(out, "Successful requests: {}", op.successes);
        let _ = writeln!(out, "Success rate: {:.1}%", op.success_rate);
        let _ = writeln!(out);
        let _ = writeln!(out, "Attempted: {} fields, {} edges", op.attempted_fields, op.attempted_edges);
        let _ = writeln!(out, "Succeeded: {} fields, {} edges", op.succeeded_fields, op.succeeded_edges);
        let _ = writeln!(out, "Schema:    {} fields, {} edges", op.schema_fields, op.schema_edges);
        let _ = writeln!(out);
        let _ = writeln!(out, "Attempted field coverage: {:.1}%", op.attempted_field_coverage);
        let _ = writeln!(out, "Succeeded field coverage: {:.1}%", op.succeeded_field_coverage);
        let _ = writeln!(out, "Attempted edge coverage: {:.1}%", op.attempted_edge_coverage);
        let _ = writeln!(out, "Succeeded edge coverage: {:.1}%", op.succeeded_edge_coverage);
        let _ = writeln!(out);
        let _ = writeln!(out, "Field quality index: {:.1}", op.field_quality_index);
        let _ = writeln!(out, "Edge quality index: {:.1}", op.edge_quality_index);
        let _ = writeln!(out, "Composite quality score: {:.1}", op.composite_quality_score);
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "================= OVERALL =================");
    let _ = writeln!(
        out,
        "Covered operations: {}/{} ({:.1}%)",
        report.covered_operations,
        report.total_operations,
        report.coverage_ratio * 100.0
    );
    let _ = writeln!(
        out,
        "Requests: {} ({} successful, {:.1}%)",
        report.total_requests, report.total_successes, report.success_rate
    );
    let _ = writeln!(out, "Field coverage: {:.1}%", report.field_coverage);
    let _ = writeln!(out, "Edge coverage: {:.1}%", report.edge_coverage);
    out
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    ratio(part, whole) * 100.0
}
