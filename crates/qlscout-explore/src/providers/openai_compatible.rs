//! OpenAI-compatible chat completions backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{non_empty, post_json, TextGenerator};
use crate::error::GenerateError;

pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatibleGenerator {
    pub fn new(client: reqwest::Client, base_url: String, model: String, api_key: String) -> Self {
        OpenAiCompatibleGenerator {
            client,
            base_url,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2
        });
        let request = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key));

        let text = post_json(request, &body).await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|err| GenerateError::Parse(err.to_string()))?;

        non_empty(
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
