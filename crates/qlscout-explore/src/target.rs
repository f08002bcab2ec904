//! HTTP client for the GraphQL endpoint under exploration.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use qlscout_core::INTROSPECTION_QUERY;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ExploreError;
use crate::history::FallbackProbe;

/// Raw outcome of one POST to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// `None` when the request never produced an HTTP response.
    pub status: Option<u16>,
    pub body: Value,
    pub elapsed_ms: u64,
    pub fallback: Option<FallbackProbe>,
}

impl Execution {
    /// `null`, `{}` and `[]` bodies carry no signal at all.
    pub fn is_empty_body(&self) -> bool {
        match &self.body {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// Parses an optional headers JSON object into name/value pairs.
///
/// Blank input means no headers. String values are used as-is; any other
/// value is sent as its JSON text.
pub fn parse_headers_json(raw: Option<&str>) -> Result<IndexMap<String, String>, ExploreError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(IndexMap::new());
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ExploreError::Config(format!("Invalid headers JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(ExploreError::Config(
            "headers JSON must be an object".to_string(),
        ));
    };
    Ok(map
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => (name, s),
            other => (name, other.to_string()),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct GraphQlTarget {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    fallback_query: String,
}

impl GraphQlTarget {
    /// Builds a client for `endpoint` sending `headers` on every request.
    pub fn new(
        endpoint: &str,
        headers: &IndexMap<String, String>,
        timeout: Duration,
        fallback_query: impl Into<String>,
    ) -> Result<Self, ExploreError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| ExploreError::Config(format!("invalid endpoint url '{endpoint}': {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ExploreError::Config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ExploreError::Config(format!("invalid value for header '{name}': {e}")))?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| ExploreError::Transport(e.to_string()))?;

        Ok(GraphQlTarget {
            client,
            endpoint,
            fallback_query: fallback_query.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Sends `query`; on an empty body, follows up once with the fallback
    /// query and attaches that exchange as a probe.
    pub async fn execute(&self, query: &str) -> Execution {
        let mut execution = self.post(query).await;
        if execution.is_empty_body() {
            debug!(endpoint = %self.endpoint, "empty response body, sending fallback probe");
            let probe = self.post(&self.fallback_query).await;
            execution.fallback = Some(FallbackProbe {
                query: self.fallback_query.clone(),
                http_status: probe.status,
                response_body: probe.body,
            });
        }
        execution
    }

    /// One POST of `{query, variables: {}}`. Never fails: transport errors
    /// become a `None` status with an `{"error": ...}` body and non-JSON
    /// bodies are wrapped as `{"error": "Invalid JSON", "raw": ...}`.
    pub async fn post(&self, query: &str) -> Execution {
        let started = Instant::now();
        let payload = json!({ "query": query, "variables": {} });
        let sent = self.client.post(self.endpoint.clone()).json(&payload).send().await;

        let (status, body) = match sent {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(text) => (Some(status), parse_body(&text)),
                    Err(err) => (Some(status), json!({ "error": err.to_string() })),
                }
            }
            Err(err) => (None, json!({ "error": err.to_string() })),
        };

        Execution {
            status,
            body,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            fallback: None,
        }
    }

    /// Runs the full introspection query and returns the response JSON.
    pub async fn introspect(&self) -> Result<Value, ExploreError> {
        let execution = self.post(INTROSPECTION_QUERY).await;
        match execution.status {
            None => Err(ExploreError::Introspection(format!(
                "endpoint unreachable: {}",
                error_text(&execution.body)
            ))),
            Some(status) if !(200..300).contains(&status) => Err(ExploreError::Introspection(
                format!("endpoint answered HTTP {status}"),
            )),
            Some(_) if execution.body.get("raw").is_some() => Err(ExploreError::Introspection(
                "endpoint returned a non-JSON body".to_string(),
            )),
            Some(_) => Ok(execution.body),
        }
    }
}

fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "error": "Invalid JSON", "raw": text }))
}

fn error_text(body: &Value) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string()
}
