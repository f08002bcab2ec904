//! End-to-end tests for the run API.
//!
//! Each test builds a router over a temp runs directory and a scripted text
//! generator, points runs at a local GraphQL stub, and drives everything
//! through `tower::ServiceExt::oneshot`.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::*;

#[tokio::test]
async fn health_reports_ok() {
    let (app, _dir) = test_app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn run_completes_and_serves_results() {
    let endpoint = spawn_stub().await;
    let (app, _dir) = test_app();

    let run_id = create_run(
        &app,
        json!({
            "endpointUrl": endpoint,
            "llmProvider": "ollama",
            "rounds": 2,
            "requestsPerNode": 3,
            "notes": "smoke",
            "seed": 7
        }),
    )
    .await;

    let view = wait_for_terminal(&app, &run_id).await;
    assert_eq!(view["status"], "done", "run ended badly: {view:?}");
    assert_eq!(view["progress"]["pct"], 1.0);
    assert_eq!(view["progress"]["stage"], "done");
    assert!(view["startedAt"].is_string());
    assert!(view["finishedAt"].is_string());
    assert!(view["error"].is_null());

    let (status, logs) = get_json(&app, &format!("/api/runs/{run_id}/logs")).await;
    assert_eq!(status, StatusCode::OK);
    let lines: Vec<&str> = logs["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l.as_str().unwrap())
        .collect();
    assert!(lines.iter().all(|l| l.starts_with('[')));
    assert!(lines.iter().any(|l| l.contains("Round 1:")));
    assert!(lines.iter().any(|l| l.contains("Round 2/2 complete")));
    assert!(lines.last().unwrap().ends_with("Run complete. Artifacts written."));

    let (status, results) = get_json(&app, &format!("/api/runs/{run_id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["summary"]["runId"], run_id);
    assert_eq!(results["summary"]["notes"], "smoke");
    assert_eq!(results["summary"]["rounds"], 2);
    assert_eq!(results["summary"]["operations"], 2);
    assert!(results["summary"]["coveredOperations"].as_u64().unwrap() >= 1);
    assert!(results["rawJson"].as_object().is_some_and(|raw| !raw.is_empty()));

    let artifacts = results["artifacts"].as_array().unwrap();
    let names: Vec<&str> = artifacts.iter().map(|a| a["name"].as_str().unwrap()).collect();
    for expected in ["summary.json", "results.json", "summary.txt", "coverage_report.txt", "logs.txt"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }

    let (status, bytes) = get_raw(&app, &format!("/api/runs/{run_id}/artifacts/results.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!bytes.is_empty());
    let (status, table) = get_raw(&app, &format!("/api/runs/{run_id}/artifacts/summary.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(table).unwrap().contains("Operation"));
    let (status, report) = get_raw(&app, &format!("/api/runs/{run_id}/artifacts/coverage_report.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(report).unwrap().contains("Field quality index:"));
    assert!(results["summary"]["successRate"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn logs_cursor_only_moves_forward() {
    let endpoint = spawn_stub().await;
    let (app, _dir) = test_app();
    let run_id = create_run(&app, json!({ "endpointUrl": endpoint, "rounds": 1, "requestsPerNode": 1 })).await;
    wait_for_terminal(&app, &run_id).await;

    let (_, first) = get_json(&app, &format!("/api/runs/{run_id}/logs?cursor=0")).await;
    let total = first["lines"].as_array().unwrap().len();
    assert!(total > 0);
    assert_eq!(first["nextCursor"], total);

    let (_, tail) = get_json(&app, &format!("/api/runs/{run_id}/logs?cursor=2")).await;
    assert_eq!(tail["lines"].as_array().unwrap().len(), total - 2);
    assert_eq!(tail["lines"][0], first["lines"][2]);
    assert_eq!(tail["nextCursor"], total);

    let (_, past) = get_json(&app, &format!("/api/runs/{run_id}/logs?cursor={}", total + 10)).await;
    assert!(past["lines"].as_array().unwrap().is_empty());
    assert_eq!(past["nextCursor"], total + 10);
}

#[tokio::test]
async fn invalid_configs_are_rejected_without_creating_runs() {
    let (app, dir) = test_app();
    let cases = [
        json!({ "endpointUrl": "ftp://example.com/graphql" }),
        json!({ "endpointUrl": "not a url" }),
        json!({ "endpointUrl": "http://example.com/graphql", "rounds": 0 }),
        json!({ "endpointUrl": "http://example.com/graphql", "rounds": 6 }),
        json!({ "endpointUrl": "http://example.com/graphql", "requestsPerNode": 11 }),
        json!({ "endpointUrl": "http://example.com/graphql", "rounds": -1 }),
        json!({ "endpointUrl": "http://example.com/graphql", "graphqlHeadersJson": "[1]" }),
        json!({ "endpointUrl": "http://example.com/graphql", "graphqlHeadersJson": "{nope" }),
        json!({ "endpointUrl": "http://example.com/graphql", "llmProvider": "anthropic" }),
        json!({ "endpointUrl": "http://example.com/graphql", "llmProvider": "gemini" }),
        json!({ "endpointUrl": "http://example.com/graphql", "llmProvider": "openai_compatible", "apiKey": " " }),
        json!({ "rounds": 1 }),
    ];
    for body in cases {
        let (status, json) = post_json(&app, "/api/runs", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {body}: {json:?}");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let (status, json) = post_json(
        &app,
        "/api/runs",
        json!({ "endpointUrl": "http://example.com/graphql", "llmProvider": "gemini" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["message"], "apiKey required for gemini");
}

#[tokio::test]
async fn unknown_runs_are_not_found() {
    let (app, _dir) = test_app();
    for path in [
        "/api/runs/missing",
        "/api/runs/missing/logs",
        "/api/runs/missing/results",
        "/api/runs/missing/artifacts/results.json",
    ] {
        let (status, json) = get_json(&app, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }
    let (status, _) = post_json(&app, "/api/runs/missing/cancel", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_stops_a_running_run() {
    let endpoint = spawn_stub().await;
    let (app, _dir) = test_app_with(
        ScriptedSource {
            reply: "no queries here".to_string(),
            delay: Duration::from_millis(100),
        },
        |_| {},
    );
    let run_id = create_run(
        &app,
        json!({ "endpointUrl": endpoint, "rounds": 5, "requestsPerNode": 10 }),
    )
    .await;
    wait_for_running(&app, &run_id).await;

    let (status, json) = get_json(&app, &format!("/api/runs/{run_id}/results")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["message"], "results not ready");

    let (status, json) = post_json(&app, &format!("/api/runs/{run_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "running");

    let view = wait_for_terminal(&app, &run_id).await;
    assert_eq!(view["status"], "cancelled");
    assert_eq!(view["progress"]["stage"], "cancelled");
    assert!(view["progress"]["pct"].as_f64().unwrap() < 1.0);

    let (_, logs) = get_json(&app, &format!("/api/runs/{run_id}/logs")).await;
    let lines = logs["lines"].as_array().unwrap();
    let requested = lines
        .iter()
        .filter(|l| l.as_str().unwrap().ends_with("Cancellation requested"))
        .count();
    assert_eq!(requested, 1);
    assert!(lines.last().unwrap().as_str().unwrap().ends_with("Run cancelled"));

    let (status, json) = post_json(&app, &format!("/api/runs/{run_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
}

#[tokio::test]
async fn unreachable_endpoint_fails_the_run() {
    let (app, _dir) = test_app();
    let run_id = create_run(
        &app,
        json!({ "endpointUrl": "http://127.0.0.1:1/graphql", "rounds": 1, "requestsPerNode": 1 }),
    )
    .await;

    let view = wait_for_terminal(&app, &run_id).await;
    assert_eq!(view["status"], "failed");
    assert_eq!(view["progress"]["stage"], "failed");
    assert!(view["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (_, logs) = get_json(&app, &format!("/api/runs/{run_id}/logs")).await;
    let lines = logs["lines"].as_array().unwrap();
    assert!(lines.iter().any(|l| l.as_str().unwrap().contains("Run failed: ")), "{lines:?}");

    let (status, _) = get_json(&app, &format!("/api/runs/{run_id}/results")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subprocess_mode_fails_when_the_cli_is_missing() {
    let (app, _dir) = test_app_with(
        ScriptedSource {
            reply: FILM_REPLY.to_string(),
            delay: Duration::ZERO,
        },
        |settings| settings.cli_bin = "/nonexistent/qlscout".into(),
    );
    let run_id = create_run(
        &app,
        json!({ "endpointUrl": "http://example.com/graphql", "mode": "subprocess" }),
    )
    .await;

    let view = wait_for_terminal(&app, &run_id).await;
    assert_eq!(view["status"], "failed");
    assert!(view["error"].as_str().unwrap().contains("failed to start"));
}

/// A stand-in `qlscout` binary that echoes one log line and writes the two
/// result files into `--out`.
#[cfg(unix)]
fn fake_cli(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-qlscout.sh");
    let script = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--out" ]; then out="$2"; shift; fi
  shift
done
echo "Exploring with the stand-in cli"
printf '{"operations":2,"coveredOperations":1}' > "$out/summary.json"
printf '{"executions":{}}' > "$out/results.json"
"#;
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn subprocess_results_carry_run_id_and_notes() {
    let bin_dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(bin_dir.path());
    let (app, _dir) = test_app_with(
        ScriptedSource {
            reply: FILM_REPLY.to_string(),
            delay: Duration::ZERO,
        },
        move |settings| settings.cli_bin = cli,
    );
    let run_id = create_run(
        &app,
        json!({
            "endpointUrl": "http://example.com/graphql",
            "mode": "subprocess",
            "notes": "nightly"
        }),
    )
    .await;

    let view = wait_for_terminal(&app, &run_id).await;
    assert_eq!(view["status"], "done", "run ended badly: {view:?}");

    let (status, results) = get_json(&app, &format!("/api/runs/{run_id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["summary"]["runId"], run_id);
    assert_eq!(results["summary"]["notes"], "nightly");
    assert_eq!(results["summary"]["operations"], 2);
    assert_eq!(results["rawJson"], json!({ "executions": {} }));

    let (_, on_disk) = get_json(&app, &format!("/api/runs/{run_id}/artifacts/summary.json")).await;
    assert_eq!(on_disk["runId"], run_id);

    let (_, logs) = get_json(&app, &format!("/api/runs/{run_id}/logs")).await;
    let lines = logs["lines"].as_array().unwrap();
    assert!(lines
        .iter()
        .any(|l| l.as_str().unwrap().ends_with("Exploring with the stand-in cli")));
}

#[tokio::test]
async fn artifact_paths_cannot_escape_the_run_directory() {
    let endpoint = spawn_stub().await;
    let (app, dir) = test_app();
    std::fs::write(dir.path().join("secret.txt"), "top secret").unwrap();
    let run_id = create_run(&app, json!({ "endpointUrl": endpoint, "rounds": 1, "requestsPerNode": 1 })).await;
    wait_for_terminal(&app, &run_id).await;

    for name in ["..%2Fsecret.txt", "..%5Csecret.txt", "..", "sub%2Flogs.txt"] {
        let (status, json) = get_json(&app, &format!("/api/runs/{run_id}/artifacts/{name}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name}: {json:?}");
    }

    let (status, _) = get_json(&app, &format!("/api/runs/{run_id}/artifacts/nothing.json")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, bytes) = get_raw(&app, &format!("/api/runs/{run_id}/artifacts/logs.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(bytes).unwrap().contains("Run complete."));
}
