//! Test doubles shared by the engine and pipeline tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::GenerateError;
use crate::observer::ExplorationObserver;
use crate::providers::TextGenerator;

/// Replies with a fixed script, cycling when it runs out.
pub(crate) struct ScriptedGenerator {
    replies: Vec<Result<String, GenerateError>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(replies: Vec<Result<String, GenerateError>>) -> Self {
        ScriptedGenerator {
            replies,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.replies.is_empty() {
            return Err(GenerateError::Empty);
        }
        self.replies[n % self.replies.len()].clone()
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    cancelled: AtomicBool,
    lines: Mutex<Vec<String>>,
    progress: Mutex<Vec<(f64, String)>>,
}

impl RecordingObserver {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn stages(&self) -> Vec<String> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .map(|(_, stage)| stage.clone())
            .collect()
    }

    pub(crate) fn percentages(&self) -> Vec<f64> {
        self.progress.lock().unwrap().iter().map(|(pct, _)| *pct).collect()
    }
}

#[async_trait]
impl ExplorationObserver for RecordingObserver {
    async fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn log(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }

    async fn progress(&self, pct: f64, stage: &str, _detail: Option<String>) {
        self.progress.lock().unwrap().push((pct, stage.to_string()));
    }
}

/// Introspection response of the stub: `film(id: ID!)`, `allFilms`, and the
/// `rateFilm` mutation.
pub(crate) fn stub_introspection() -> Value {
    json!({ "data": { "__schema": {
        "queryType": { "name": "Query" },
        "mutationType": { "name": "Mutation" },
        "types": [
            { "kind": "OBJECT", "name": "Query", "fields": [
                { "name": "film", "args": [
                    { "name": "id", "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "ID" } } }
                ], "type": { "kind": "OBJECT", "name": "Film" } },
                { "name": "allFilms", "args": [], "type": { "kind": "OBJECT", "name": "FilmsConnection" } }
            ]},
            { "kind": "OBJECT", "name": "Mutation", "fields": [
                { "name": "rateFilm", "args": [
                    { "name": "stars", "type": { "kind": "SCALAR", "name": "Int" } }
                ], "type": { "kind": "OBJECT", "name": "Film" } }
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
    }}})
}

async fn stub_graphql(Json(body): Json<Value>) -> Json<Value> {
    let query = body.get("query").and_then(Value::as_str).unwrap_or_default();
    let reply = if query.contains("__schema") {
        stub_introspection()
    } else if query.contains("__typename") {
        json!({ "data": { "__typename": "Query" } })
    } else if query.contains("empty") {
        json!({})
    } else if query.contains("film(") && query.contains("title") {
        json!({ "data": { "film": { "id": "1", "title": "A New Hope" } } })
    } else {
        json!({ "data": null, "errors": [ { "message": "Cannot query field" } ] })
    };
    Json(reply)
}

/// Starts the stub GraphQL endpoint on an ephemeral port and returns its URL.
pub(crate) async fn spawn_stub() -> String {
    let app = Router::new().route("/graphql", post(stub_graphql));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/graphql")
}
