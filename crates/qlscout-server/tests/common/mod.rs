//! Shared fixtures for the run API integration tests: a local GraphQL stub,
//! a scripted text generator, and request helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use qlscout_explore::{ExploreError, GenerateError, TextGenerator};
use qlscout_server::router::build_router;
use qlscout_server::runs::RunConfig;
use qlscout_server::runner::GeneratorSource;
use qlscout_server::settings::Settings;
use qlscout_server::state::AppState;

/// A reply that covers `film` on the stub.
pub const FILM_REPLY: &str = "```graphql\nquery { film(id: \"1\") { id title } }\n```";

/// Always answers with the same text, optionally after a delay.
pub struct ScriptedGenerator {
    reply: String,
    delay: Duration,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerateError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }
}

pub struct ScriptedSource {
    pub reply: String,
    pub delay: Duration,
}

impl GeneratorSource for ScriptedSource {
    fn generator(
        &self,
        _config: &RunConfig,
        _settings: &Settings,
    ) -> Result<Arc<dyn TextGenerator>, ExploreError> {
        Ok(Arc::new(ScriptedGenerator {
            reply: self.reply.clone(),
            delay: self.delay,
        }))
    }
}

/// Router whose runs use a scripted generator and a temp runs directory.
pub fn test_app_with(source: ScriptedSource, tweak: impl FnOnce(&mut Settings)) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings {
        runs_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    tweak(&mut settings);
    let state = AppState::with_generators(settings, Arc::new(source))
        .expect("failed to create AppState");
    (build_router(state), dir)
}

pub fn test_app() -> (Router, TempDir) {
    test_app_with(
        ScriptedSource {
            reply: FILM_REPLY.to_string(),
            delay: Duration::ZERO,
        },
        |_| {},
    )
}

/// Sends a POST request with a JSON body and returns (status, json).
pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));
    (status, json)
}

/// Sends a GET request and returns (status, raw body).
pub async fn get_raw(app: &Router, path: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body_bytes.to_vec())
}

/// Sends a GET request and returns (status, json).
pub async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let (status, bytes) = get_raw(app, path).await;
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

/// Creates a run and returns its id.
pub async fn create_run(app: &Router, body: Value) -> String {
    let (status, json) = post_json(app, "/api/runs", body).await;
    assert_eq!(status, StatusCode::OK, "create run failed: {json:?}");
    assert_eq!(json["status"], "queued");
    json["runId"].as_str().unwrap().to_string()
}

/// Polls the status endpoint until the run leaves `queued`/`running`.
pub async fn wait_for_terminal(app: &Router, run_id: &str) -> Value {
    for _ in 0..300 {
        let (status, json) = get_json(app, &format!("/api/runs/{run_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if !matches!(json["status"].as_str(), Some("queued") | Some("running")) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run {run_id} did not finish");
}

/// Polls until the run reports `running`.
pub async fn wait_for_running(app: &Router, run_id: &str) {
    for _ in 0..200 {
        let (_, json) = get_json(app, &format!("/api/runs/{run_id}")).await;
        if json["status"] == "running" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never started");
}

fn stub_introspection() -> Value {
    json!({ "data": { "__schema": {
        "queryType": { "name": "Query" },
        "mutationType": null,
        "types": [
            { "kind": "OBJECT", "name": "Query", "fields": [
                { "name": "film", "args": [
                    { "name": "id", "type": { "kind": "NON_NULL", "ofType": { "kind": "SCALAR", "name": "ID" } } }
                ], "type": { "kind": "OBJECT", "name": "Film" } },
                { "name": "allFilms", "args": [], "type": { "kind": "LIST", "ofType": { "kind": "OBJECT", "name": "Film" } } }
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
    } else if query.contains("film(") && query.contains("title") {
        json!({ "data": { "film": { "id": "1", "title": "A New Hope" } } })
    } else {
        json!({ "data": null, "errors": [ { "message": "Cannot query field" } ] })
    };
    Json(reply)
}

/// Starts the stub GraphQL endpoint on an ephemeral port and returns its URL.
pub async fn spawn_stub() -> String {
    let app = Router::new().route("/graphql", post(stub_graphql));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/graphql")
}
