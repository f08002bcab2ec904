//! Run API request/response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runs::RunStatus;

/// Response from `POST /api/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: String,
    pub status: RunStatus,
}

/// Response from `POST /api/runs/{id}/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: RunStatus,
}

/// Query string of `GET /api/runs/{id}/logs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    /// Index of the first line to return.
    #[serde(default)]
    pub cursor: usize,
}

/// A downloadable file in the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub url: String,
}

/// Response from `GET /api/runs/{id}/results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub summary: Value,
    pub raw_json: Value,
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
