//! Run-creation validation. A config that fails here never becomes a run.

use indexmap::IndexMap;
use qlscout_explore::{parse_headers_json, ExploreError, ProviderConfig, ProviderKind};

use crate::error::ApiError;
use crate::runs::RunConfig;
use crate::settings::Settings;

/// The parts of a [`RunConfig`] that validation had to parse anyway.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRun {
    pub provider: ProviderKind,
    pub headers: IndexMap<String, String>,
}

pub fn validate_run_config(
    config: &RunConfig,
    settings: &Settings,
) -> Result<ValidatedRun, ApiError> {
    validate_http_url(&config.endpoint_url)?;

    if !(1..=settings.max_rounds).contains(&config.rounds) {
        return Err(ApiError::BadRequest(format!(
            "rounds must be between 1 and {}",
            settings.max_rounds
        )));
    }
    if !(1..=settings.max_requests_per_node).contains(&config.requests_per_node) {
        return Err(ApiError::BadRequest(format!(
            "requestsPerNode must be between 1 and {}",
            settings.max_requests_per_node
        )));
    }

    let headers = parse_headers_json(config.graphql_headers_json.as_deref()).map_err(bad_request)?;
    let provider = ProviderConfig::resolve(
        &config.llm_provider,
        config.model.as_deref(),
        config.api_key.as_deref(),
        None,
    )
    .map_err(bad_request)?;

    Ok(ValidatedRun {
        provider: provider.kind,
        headers,
    })
}

fn bad_request(err: ExploreError) -> ApiError {
    match err {
        ExploreError::Config(msg) => ApiError::BadRequest(msg),
        other => ApiError::BadRequest(other.to_string()),
    }
}

/// Requires an http(s) URL with a host.
pub fn validate_http_url(raw: &str) -> Result<(), ApiError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ApiError::BadRequest(format!("endpointUrl is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(
            "endpointUrl must be http or https".to_string(),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ApiError::BadRequest("endpointUrl is missing host".to_string()));
    }
    Ok(())
}
