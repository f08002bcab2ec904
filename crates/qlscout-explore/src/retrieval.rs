//! Known-value retrieval.
//!
//! Successful responses are flattened into small text records ("film 1 has
//! title A New Hope") that later prompts can quote as real argument values.
//! [`SimilarityIndex`] is the seam; [`KnownValueIndex`] is the built-in,
//! dependency-free implementation scoring records by token overlap.

use std::collections::HashSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use qlscout_core::query_text::extract_top_level_field;
use qlscout_core::SchemaGraph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::ExploreError;
use crate::history::ExecutionLog;

/// One flattened data record harvested from a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownValueRecord {
    pub text: String,
    /// `query` or `mutation`.
    pub source: String,
    pub operation: String,
    pub node_type: String,
    pub fields: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub score: f64,
    pub record: KnownValueRecord,
}

/// Nearest-record lookup over harvested known values.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Up to `top_k` records, best first.
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<ScoredRecord>, ExploreError>;

    /// Replaces the indexed records. Indexes maintained elsewhere may ignore
    /// this.
    async fn refresh(&self, records: Vec<KnownValueRecord>) -> Result<(), ExploreError> {
        let _ = records;
        Ok(())
    }
}

/// In-memory index scoring by normalized token overlap.
#[derive(Debug, Default)]
pub struct KnownValueIndex {
    records: RwLock<Vec<(KnownValueRecord, HashSet<String>)>>,
}

impl KnownValueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SimilarityIndex for KnownValueIndex {
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<ScoredRecord>, ExploreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let needle = tokens(text);
        let records = self.records.read().await;

        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .map(|(record, haystack)| ScoredRecord {
                score: overlap(&needle, haystack),
                record: record.clone(),
            })
            .collect();
        // Stable sort keeps harvest order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn refresh(&self, records: Vec<KnownValueRecord>) -> Result<(), ExploreError> {
        let indexed = records
            .into_iter()
            .map(|record| {
                let toks = tokens(&record.text);
                (record, toks)
            })
            .collect();
        *self.records.write().await = indexed;
        Ok(())
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    shared / ((a.len() * b.len()) as f64).sqrt()
}

/// Flattens every successful execution into known-value records.
///
/// Results are attributed to the operation their query actually selects,
/// which is not always the operation whose history holds them. Connection
/// (`edges[].node`), `results`, list, and single-object shapes are unwrapped;
/// each record keeps its top-level scalar fields. Records without any scalar
/// field, and duplicates, are skipped.
pub fn harvest_records(graph: &SchemaGraph, log: &ExecutionLog) -> Vec<KnownValueRecord> {
    let mut harvested = Vec::new();
    let mut seen = HashSet::new();

    for (logged_op, results) in log.operations() {
        for result in results.iter().filter(|r| r.success) {
            let op_name = extract_top_level_field(&result.query)
                .filter(|name| graph.operation(name).is_some())
                .unwrap_or_else(|| logged_op.to_string());
            let Some(op) = graph.operation(&op_name) else {
                continue;
            };
            let Some(data) = result.response_body.get("data").and_then(Value::as_object) else {
                continue;
            };
            let Some(top) = data.get(&op_name).or_else(|| single_value(data)) else {
                continue;
            };

            for item in record_items(top) {
                let fields: IndexMap<String, Value> = item
                    .iter()
                    .filter(|(_, v)| !(v.is_null() || v.is_object() || v.is_array()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if fields.is_empty() {
                    continue;
                }

                let record = KnownValueRecord {
                    text: render_record(op.source.as_str(), &op_name, &op.terminal_node_type, &fields),
                    source: op.source.to_string(),
                    operation: op_name.clone(),
                    node_type: op.terminal_node_type.clone(),
                    fields,
                };
                if seen.insert(record.text.clone()) {
                    harvested.push(record);
                }
            }
        }
    }
    harvested
}

fn single_value(data: &Map<String, Value>) -> Option<&Value> {
    if data.len() == 1 {
        data.values().next()
    } else {
        None
    }
}

fn record_items(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(edges)) = map.get("edges") {
                return edges
                    .iter()
                    .filter_map(|edge| edge.get("node").and_then(Value::as_object))
                    .collect();
            }
            if let Some(Value::Array(results)) = map.get("results") {
                return results.iter().filter_map(Value::as_object).collect();
            }
            vec![map]
        }
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

fn render_record(
    source: &str,
    operation: &str,
    node_type: &str,
    fields: &IndexMap<String, Value>,
) -> String {
    let mut lines = vec![
        format!("GraphQL source: {source}"),
        format!("Query: {operation}"),
        format!("Node Type: {node_type}"),
        String::new(),
        "Fields:".to_string(),
    ];
    for (key, value) in fields {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("- {key}: {rendered}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ExecutionResult;
    use crate::target::Execution;
    use serde_json::json;

    fn graph() -> SchemaGraph {
        SchemaGraph::from_introspection(&json!({ "data": { "__schema": {
            "queryType": { "name": "Query" },
            "types": [
                { "kind": "OBJECT", "name": "Query", "fields": [
                    { "name": "film", "args": [], "type": { "kind": "OBJECT", "name": "Film" } },
                    { "name": "allFilms", "args": [], "type": { "kind": "OBJECT", "name": "FilmsConnection" } }
                ]},
                { "kind": "OBJECT", "name": "FilmsConnection", "fields": [
                    { "name": "edges", "args": [], "type": { "kind": "LIST", "ofType": { "kind": "OBJECT", "name": "FilmsEdge" } } }
                ]},
                { "kind": "OBJECT", "name": "FilmsEdge", "fields": [
                    { "name": "node", "args": [], "type": { "kind": "OBJECT", "name": "Film" } }
                ]},
                { "kind": "OBJECT", "name": "Film", "fields": [
                    { "name": "id", "args": [], "type": { "kind": "SCALAR", "name": "ID" } },
                    { "name": "title", "args": [], "type": { "kind": "SCALAR", "name": "String" } }
                ]}
            ]
        }}}))
    }

    fn success(query: &str, body: Value) -> ExecutionResult {
        ExecutionResult::new(
            query,
            "schema_min_known",
            1,
            Execution {
                status: Some(200),
                body,
                elapsed_ms: 1,
                fallback: None,
            },
        )
    }

    #[test]
    fn harvests_connections_and_single_objects() {
        let mut log = ExecutionLog::in_memory();
        log.record(
            "allFilms",
            success(
                "{ allFilms { edges { node { id title } } } }",
                json!({ "data": { "allFilms": { "edges": [
                    { "node": { "id": "1", "title": "A New Hope" } },
                    { "node": { "id": "2", "title": "The Empire Strikes Back" } }
                ] } } }),
            ),
        )
        .unwrap();
        log.record(
            "film",
            success(
                "{ film(id: \"1\") { id title } }",
                json!({ "data": { "film": { "id": "1", "title": "A New Hope", "director": null } } }),
            ),
        )
        .unwrap();

        let records = harvest_records(&graph(), &log);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].operation, "allFilms");
        assert_eq!(records[0].node_type, "Film");
        assert!(records[0].text.contains("- title: A New Hope"));
        assert!(records[2].fields.get("director").is_none());
    }

    #[test]
    fn results_are_attributed_to_the_selected_operation() {
        let mut log = ExecutionLog::in_memory();
        log.record(
            "allFilms",
            success("{ film { title } }", json!({ "data": { "film": { "title": "x" } } })),
        )
        .unwrap();
        let records = harvest_records(&graph(), &log);
        assert_eq!(records[0].operation, "film");
    }

    #[tokio::test]
    async fn index_ranks_by_overlap() {
        let index = KnownValueIndex::new();
        assert!(index.search("film", 5).await.unwrap().is_empty());

        let mut log = ExecutionLog::in_memory();
        log.record(
            "film",
            success("{ film { title } }", json!({ "data": { "film": { "title": "Hope" } } })),
        )
        .unwrap();
        log.record(
            "allFilms",
            success(
                "{ allFilms { edges { node { id } } } }",
                json!({ "data": { "allFilms": { "edges": [ { "node": { "id": "9" } } ] } } }),
            ),
        )
        .unwrap();
        index.refresh(harvest_records(&graph(), &log)).await.unwrap();
        assert_eq!(index.len().await, 2);

        let hits = index.search("allFilms, input: {}", 5).await.unwrap();
        assert_eq!(hits[0].record.operation, "allFilms");
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(index.search("film", 1).await.unwrap().len(), 1);
        assert!(index.search("film", 0).await.unwrap().is_empty());
    }
}
