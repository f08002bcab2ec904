//! qlscout command-line tool.
//!
//! Provides the `qlscout` binary with two subcommands:
//! - `explore` runs the full exploration pipeline in-process, prints the run
//!   log to stdout and writes every artifact into `--out`. The server's
//!   subprocess run mode spawns exactly this command.
//! - `introspect` fetches a schema and prints its operations as JSON.
//!
//! Diagnostics go to stderr through `tracing`, so stdout stays the run log.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use qlscout_core::SchemaGraph;
use qlscout_explore::{
    build_generator, parse_headers_json, run_exploration, ExplorationObserver, ExplorationRequest,
    ExploreError, ExplorerConfig, GraphQlTarget, KnownValueIndex, ProviderConfig,
};

/// Exit code for invalid arguments.
const EXIT_USAGE: i32 = 2;
/// Exit code when artifacts cannot be written.
const EXIT_IO: i32 = 3;
/// Exit code after Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

/// GraphQL API explorer driven by an LLM.
///
/// Diagnostics go to stderr at info level and above.
/// Set RUST_LOG (for example RUST_LOG=qlscout_explore=debug) to change that.
#[derive(Parser)]
#[command(name = "qlscout", about = "Explore a GraphQL API with LLM-generated queries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an exploration pass and write its artifacts.
    Explore(ExploreArgs),

    /// Print the operations a GraphQL endpoint exposes.
    Introspect {
        /// GraphQL endpoint URL.
        #[arg(short, long)]
        endpoint: String,

        /// Extra request headers as a JSON object.
        #[arg(long)]
        headers_json: Option<String>,

        /// Also write the raw introspection response to this file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ExploreArgs {
    /// GraphQL endpoint URL.
    #[arg(short, long)]
    endpoint: String,

    /// Artifact directory.
    #[arg(short, long, default_value = "./qlscout-out")]
    out: PathBuf,

    #[arg(short, long, default_value_t = 2)]
    rounds: u32,

    /// Request budget per operation and round.
    #[arg(long, default_value_t = 2)]
    requests_per_node: u32,

    /// LLM provider: ollama, openai_compatible or gemini.
    #[arg(short, long, default_value = "ollama")]
    provider: String,

    /// Model name (default: the provider's default).
    #[arg(short, long)]
    model: Option<String>,

    /// Provider base URL (default: the provider's public endpoint).
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "QLSCOUT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Extra request headers as a JSON object.
    #[arg(long)]
    headers_json: Option<String>,

    /// Seed for arm sampling.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Explore(args) => run_explore(args).await,
        Commands::Introspect {
            endpoint,
            headers_json,
            out,
        } => run_introspect(&endpoint, headers_json.as_deref(), out).await,
    };
    process::exit(exit_code);
}

/// Execute the explore subcommand.
///
/// Returns exit code: 0 = success, 1 = exploration failed, 2 = bad
/// arguments, 3 = I/O error, 130 = interrupted.
async fn run_explore(args: ExploreArgs) -> i32 {
    let headers = match parse_headers_json(args.headers_json.as_deref()) {
        Ok(headers) => headers,
        Err(e) => return usage_error(e),
    };
    let provider = match ProviderConfig::resolve(
        &args.provider,
        args.model.as_deref(),
        args.api_key.as_deref(),
        args.base_url.as_deref(),
    ) {
        Ok(provider) => provider,
        Err(e) => return usage_error(e),
    };
    let generator = match build_generator(&provider) {
        Ok(generator) => generator,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_USAGE;
        }
    };

    let request = ExplorationRequest {
        endpoint_url: args.endpoint.clone(),
        headers,
        rounds: args.rounds,
        requests_per_node: args.requests_per_node,
        seed: args.seed,
        artifact_dir: args.out.clone(),
    };

    let observer = Arc::new(StdoutObserver::default());
    let interrupt = Arc::clone(&observer);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancelled.store(true, Ordering::SeqCst);
        }
    });

    println!(
        "Exploring {} with {} ({} rounds, {} requests per operation)",
        args.endpoint, provider.kind, args.rounds, args.requests_per_node
    );
    let outcome = run_exploration(
        &request,
        &ExplorerConfig::default(),
        generator,
        Arc::new(KnownValueIndex::new()),
        observer,
    )
    .await;

    match outcome {
        Ok(outcome) => match outcome.write_artifacts(&args.out) {
            Ok(()) => {
                println!("Run complete. Artifacts written to {}", args.out.display());
                0
            }
            Err(e) => {
                eprintln!("I/O error: {e}");
                EXIT_IO
            }
        },
        Err(ExploreError::Cancelled) => {
            println!("Run cancelled");
            EXIT_CANCELLED
        }
        Err(e @ (ExploreError::Io { .. } | ExploreError::Serialization(_))) => {
            eprintln!("I/O error: {e}");
            EXIT_IO
        }
        Err(ExploreError::Config(msg)) => {
            eprintln!("Error: {msg}");
            EXIT_USAGE
        }
        Err(e) => {
            eprintln!("Exploration failed: {e}");
            1
        }
    }
}

/// Execute the introspect subcommand.
///
/// Prints `{endpoint, queryType, mutationType, operations: [...]}` as JSON.
async fn run_introspect(endpoint: &str, headers_json: Option<&str>, out: Option<PathBuf>) -> i32 {
    let headers = match parse_headers_json(headers_json) {
        Ok(headers) => headers,
        Err(e) => return usage_error(e),
    };
    let config = ExplorerConfig::default();
    let target = match GraphQlTarget::new(
        endpoint,
        &headers,
        config.request_timeout,
        config.fallback_query.clone(),
    ) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_USAGE;
        }
    };

    let response = match target.introspect().await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };
    if let Some(path) = out {
        let text = serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string());
        if let Err(e) = std::fs::write(&path, text) {
            eprintln!("I/O error: failed to write '{}': {e}", path.display());
            return EXIT_IO;
        }
    }

    let graph = SchemaGraph::from_introspection(&response);
    if graph.is_empty() {
        eprintln!("Error: the schema exposes no operations");
        return 1;
    }
    let operations: Vec<Value> = graph
        .operations
        .values()
        .map(|op| {
            json!({
                "name": op.name,
                "source": op.source,
                "inputs": op.input_signatures,
                "output": op.output_signature,
            })
        })
        .collect();
    let summary = json!({
        "endpoint": endpoint,
        "queryType": graph.query_type,
        "mutationType": graph.mutation_type,
        "operations": operations,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
    );
    0
}

fn usage_error(err: ExploreError) -> i32 {
    match err {
        ExploreError::Config(msg) => eprintln!("Error: {msg}"),
        other => eprintln!("Error: {other}"),
    }
    EXIT_USAGE
}

/// Prints run log lines to stdout. Cancelled by Ctrl-C.
#[derive(Default)]
struct StdoutObserver {
    cancelled: AtomicBool,
}

#[async_trait]
impl ExplorationObserver for StdoutObserver {
    async fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn log(&self, line: String) {
        println!("{line}");
    }

    async fn progress(&self, pct: f64, stage: &str, detail: Option<String>) {
        tracing::debug!(pct, stage, detail = detail.as_deref(), "progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_accepts_the_subprocess_arguments() {
        let cli = Cli::try_parse_from([
            "qlscout",
            "explore",
            "--endpoint",
            "http://localhost:4000/graphql",
            "--out",
            "/tmp/run",
            "--rounds",
            "3",
            "--requests-per-node",
            "4",
            "--provider",
            "gemini",
            "--model",
            "gemini-pro",
            "--base-url",
            "http://gemini.local",
            "--headers-json",
            r#"{"X-Team":"red"}"#,
            "--seed",
            "11",
            "--api-key",
            "k",
        ])
        .unwrap();
        let Commands::Explore(args) = cli.command else {
            panic!("expected explore");
        };
        assert_eq!(args.rounds, 3);
        assert_eq!(args.requests_per_node, 4);
        assert_eq!(args.seed, Some(11));

        assert_eq!(args.provider, "gemini");
        assert_eq!(args.base_url.as_deref(), Some("http://gemini.local"));
    }

    #[test]
    fn help_documents_the_log_level() {
        use clap::CommandFactory;

        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("RUST_LOG"));
        assert!(help.contains(&format!("{DEFAULT_LOG_FILTER} level")));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
