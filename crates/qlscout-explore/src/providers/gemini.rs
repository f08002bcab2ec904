//! Gemini `generateContent` backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{non_empty, post_json, TextGenerator};
use crate::error::GenerateError;

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(client: reqwest::Client, base_url: String, model: String, api_key: String) -> Self {
        GeminiGenerator {
            client,
            base_url,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let request = self
            .client
            .post(endpoint)
            .query(&[("key", self.api_key.as_str())]);

        let text = post_json(request, &body).await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|err| GenerateError::Parse(err.to_string()))?;

        let first_part = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text);
        non_empty(first_part)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
