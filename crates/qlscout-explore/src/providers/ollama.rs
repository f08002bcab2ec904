//! Ollama chat backend (`POST {base}/api/chat`, non-streaming).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{non_empty, post_json, TextGenerator};
use crate::error::GenerateError;

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: reqwest::Client, base_url: String, model: String) -> Self {
        OllamaGenerator {
            client,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "options": { "temperature": 0.2 }
        });

        let text = post_json(self.client.post(endpoint), &body).await?;
        let parsed: OllamaChatResponse =
            serde_json::from_str(&text).map_err(|err| GenerateError::Parse(err.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(GenerateError::Parse(error));
        }
        non_empty(parsed.message.and_then(|m| m.content))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: Option<String>,
}
