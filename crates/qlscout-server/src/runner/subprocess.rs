//! Subprocess run mode: the whole exploration happens in a child
//! `qlscout explore` process whose stdout becomes the run log.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use serde_json::Value;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{provider_config, RunContext, RunEnd};
use crate::runs::RunConfig;

/// Environment variable carrying the provider key to the child, so it never
/// shows up in a process listing.
pub const API_KEY_ENV: &str = "QLSCOUT_API_KEY";

/// How often the cancel flag is checked while the child is silent.
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Command-line arguments for `qlscout explore` writing into `out_dir`.
pub fn explore_args(config: &RunConfig, base_url: Option<&str>, model: &str, out_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "explore".to_string(),
        "--endpoint".to_string(),
        config.endpoint_url.clone(),
        "--out".to_string(),
        out_dir.display().to_string(),
        "--rounds".to_string(),
        config.rounds.to_string(),
        "--requests-per-node".to_string(),
        config.requests_per_node.to_string(),
        "--provider".to_string(),
        config.llm_provider.clone(),
    ];
    if !model.is_empty() {
        args.extend(["--model".to_string(), model.to_string()]);
    }
    if let Some(base_url) = base_url {
        args.extend(["--base-url".to_string(), base_url.to_string()]);
    }
    if let Some(headers) = config.graphql_headers_json.as_deref().filter(|h| !h.trim().is_empty()) {
        args.extend(["--headers-json".to_string(), headers.to_string()]);
    }
    if let Some(seed) = config.seed {
        args.extend(["--seed".to_string(), seed.to_string()]);
    }
    args
}

pub(crate) async fn run(ctx: &RunContext, run_id: &str, config: &RunConfig) -> RunEnd {
    let Some(record) = ctx.registry.get_record(run_id).await else {
        return RunEnd::Failed(format!("run {run_id} disappeared"));
    };
    let provider = match provider_config(config, &ctx.settings) {
        Ok(provider) => provider,
        Err(err) => return RunEnd::Failed(err.to_string()),
    };
    let args = explore_args(config, provider.base_url.as_deref(), &provider.model, &record.run_dir);
    debug!(run_id, bin = %ctx.settings.cli_bin.display(), ?args, "spawning explore subprocess");

    let mut command = Command::new(&ctx.settings.cli_bin);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(key) = &config.api_key {
        command.env(API_KEY_ENV, key);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return RunEnd::Failed(format!(
                "failed to start {}: {err}",
                ctx.settings.cli_bin.display()
            ))
        }
    };
    let Some(stdout) = child.stdout.take() else {
        return RunEnd::Failed("subprocess stdout unavailable".to_string());
    };
    let mut lines = BufReader::new(stdout).lines();

    loop {
        if ctx.registry.is_cancelled(run_id).await {
            terminate(&mut child, run_id).await;
            return RunEnd::Cancelled;
        }
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(err) = ctx.registry.append_log(run_id, &line).await {
                        warn!(run_id, error = %err, "run log append failed");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(run_id, error = %err, "subprocess output unreadable");
                    break;
                }
            },
            _ = tokio::time::sleep(CANCEL_POLL) => {}
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(err) => return RunEnd::Failed(format!("waiting for subprocess failed: {err}")),
    };
    if ctx.registry.is_cancelled(run_id).await {
        return RunEnd::Cancelled;
    }
    if !status.success() {
        return RunEnd::Failed(match status.code() {
            Some(code) => format!("subprocess exited with status {code}"),
            None => "subprocess terminated by signal".to_string(),
        });
    }
    if !record.results_path.exists() {
        return RunEnd::Failed("subprocess finished without writing results".to_string());
    }
    let raw = match read_json(&record.results_path).await {
        Ok(raw) => raw,
        Err(message) => return RunEnd::Failed(message),
    };
    let summary = if record.summary_path.exists() {
        match read_json(&record.summary_path).await {
            Ok(summary) => summary,
            Err(message) => return RunEnd::Failed(message),
        }
    } else {
        Value::Object(serde_json::Map::new())
    };
    RunEnd::Done { summary, raw }
}

/// Reads an artifact the child wrote so it can be stamped and saved again.
async fn read_json(path: &Path) -> Result<Value, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("corrupt {}: {e}", path.display()))
}

async fn terminate(child: &mut Child, run_id: &str) {
    if let Err(err) = child.kill().await {
        warn!(run_id, error = %err, "failed to kill subprocess");
    }
}
