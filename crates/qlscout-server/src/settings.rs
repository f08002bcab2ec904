//! Server settings read from `QLSCOUT_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use qlscout_explore::providers::{
    DEFAULT_GEMINI_BASE_URL, DEFAULT_OLLAMA_BASE_URL, DEFAULT_OPENAI_BASE_URL,
};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Parent of every run's artifact directory.
    pub runs_dir: PathBuf,
    pub max_rounds: u32,
    pub max_requests_per_node: u32,
    pub ollama_base_url: String,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub default_model: String,
    /// Allowed CORS origins; empty or `*` means any origin.
    pub cors_origins: Vec<String>,
    /// `qlscout` binary spawned by subprocess-mode runs.
    pub cli_bin: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".to_string(),
            port: 8000,
            runs_dir: PathBuf::from("./runs"),
            max_rounds: 5,
            max_requests_per_node: 10,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            default_model: "llama3".to_string(),
            cors_origins: Vec::new(),
            cli_bin: PathBuf::from("qlscout"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable source. Unset or blank
    /// variables keep their defaults; unparseable numbers are logged and
    /// ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        Settings {
            host: var("QLSCOUT_HOST").unwrap_or(defaults.host),
            port: parsed(var("QLSCOUT_PORT"), "QLSCOUT_PORT", defaults.port),
            runs_dir: var("QLSCOUT_RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.runs_dir),
            max_rounds: parsed(var("QLSCOUT_MAX_ROUNDS"), "QLSCOUT_MAX_ROUNDS", defaults.max_rounds),
            max_requests_per_node: parsed(
                var("QLSCOUT_MAX_REQUESTS_PER_NODE"),
                "QLSCOUT_MAX_REQUESTS_PER_NODE",
                defaults.max_requests_per_node,
            ),
            ollama_base_url: var("QLSCOUT_OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            openai_base_url: var("QLSCOUT_OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            gemini_base_url: var("QLSCOUT_GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            default_model: var("QLSCOUT_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            cors_origins: var("QLSCOUT_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            cli_bin: var("QLSCOUT_CLI_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.cli_bin),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parsed<T: FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = key, value = %raw, "ignoring unparseable setting");
            default
        }),
        None => default,
    }
}
