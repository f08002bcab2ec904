//! Text-generation seam and its concrete backends.
//!
//! The engine only ever sees `dyn TextGenerator`. [`build_generator`] maps a
//! provider name plus credentials onto one of the bundled backends.

mod gemini;
mod ollama;
mod openai_compatible;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExploreError, GenerateError};

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;
pub use openai_compatible::OpenAiCompatibleGenerator;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Generation requests may take a while on local models.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Produces free text for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    OpenaiCompatible,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenaiCompatible => "openai_compatible",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn requires_api_key(self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "llama3",
            ProviderKind::OpenaiCompatible => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Ollama => DEFAULT_OLLAMA_BASE_URL,
            ProviderKind::OpenaiCompatible => DEFAULT_OPENAI_BASE_URL,
            ProviderKind::Gemini => DEFAULT_GEMINI_BASE_URL,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = GenerateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai_compatible" => Ok(ProviderKind::OpenaiCompatible),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(GenerateError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to construct a backend.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Empty means the provider's default model.
    pub model: String,
    pub api_key: Option<String>,
    /// `None` means the provider's public default.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        ProviderConfig {
            kind,
            model: String::new(),
            api_key: None,
            base_url: None,
        }
    }

    /// Builds a config from user-facing settings: a provider name plus
    /// optional model, key and base URL. Blank values count as absent.
    ///
    /// Fails with [`GenerateError::UnknownProvider`] or
    /// [`GenerateError::MissingApiKey`] wrapped in [`ExploreError::Provider`].
    pub fn resolve(
        provider: &str,
        model: Option<&str>,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self, ExploreError> {
        let kind: ProviderKind = provider.trim().parse()?;
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let api_key = present(api_key);
        if kind.requires_api_key() && api_key.is_none() {
            return Err(GenerateError::MissingApiKey {
                provider: kind.to_string(),
            }
            .into());
        }
        Ok(ProviderConfig {
            kind,
            model: present(model).unwrap_or_default(),
            api_key,
            base_url: present(base_url),
        })
    }

    fn model(&self) -> String {
        if self.model.trim().is_empty() {
            self.kind.default_model().to_string()
        } else {
            self.model.clone()
        }
    }

    fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.kind.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Builds the backend described by `config`.
pub fn build_generator(config: &ProviderConfig) -> Result<Arc<dyn TextGenerator>, GenerateError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty());
    if config.kind.requires_api_key() && api_key.is_none() {
        return Err(GenerateError::MissingApiKey {
            provider: config.kind.to_string(),
        });
    }

    let client = reqwest::Client::builder()
        .timeout(GENERATION_TIMEOUT)
        .build()
        .map_err(|e| GenerateError::Transport(e.to_string()))?;
    let base_url = config.base_url();
    let model = config.model();
    let api_key = api_key.unwrap_or_default();

    let generator: Arc<dyn TextGenerator> = match config.kind {
        ProviderKind::Ollama => Arc::new(OllamaGenerator::new(client, base_url, model)),
        ProviderKind::OpenaiCompatible => {
            Arc::new(OpenAiCompatibleGenerator::new(client, base_url, model, api_key))
        }
        ProviderKind::Gemini => Arc::new(GeminiGenerator::new(client, base_url, model, api_key)),
    };
    Ok(generator)
}

/// Sends `body` as JSON and returns the response text, mapping transport
/// failures and non-2xx statuses onto [`GenerateError`].
pub(crate) async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<String, GenerateError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|err| GenerateError::Transport(err.to_string()))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| GenerateError::Transport(format!("response read failed: {err}")))?;

    if !status.is_success() {
        return Err(GenerateError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

pub(crate) fn non_empty(content: Option<String>) -> Result<String, GenerateError> {
    content
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(GenerateError::Empty)
}
