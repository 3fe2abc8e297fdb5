//! Model session, validation and swap DTOs

use super::validate_target;
use crate::connection::{ConnectionMapping, ModelConnectionSummary, SwapResult, SwapTarget};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to open a model document
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OpenModelRequest {
    #[validate(length(min = 1, message = "Model path is required"))]
    pub path: String,

    /// Address the model is served from; defaults to `localhost`
    pub server: Option<String>,
}

/// Detection snapshot plus the session's mappings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub path: String,
    pub model_hash: Option<String>,
    pub info: ModelConnectionSummary,
    pub mappings: Vec<ConnectionMapping>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[validate(length(min = 1, message = "Connection name is required"))]
    pub connection_name: String,

    #[validate(custom(function = "validate_target"))]
    pub target: SwapTarget,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SwapMappingRequest {
    #[validate(length(min = 1, message = "Connection name is required"))]
    pub connection_name: String,

    /// Omit to swap to the mapping's current target (reverts a flipped mapping)
    #[validate(custom(function = "validate_target"))]
    pub target: Option<SwapTarget>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    #[validate(length(min = 1, message = "At least one mapping is required"))]
    #[validate(nested)]
    pub mappings: Vec<SwapMappingRequest>,

    /// Proceed even when a target's last health check failed
    #[serde(default)]
    pub confirm: bool,
}

/// Per-mapping outcomes of one request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapBatchResponse {
    pub batch_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<SwapResult>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    #[validate(length(min = 1, message = "Connection name is required"))]
    pub connection_name: String,
}

/// Query for `GET /history`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Only entries of this file
    pub file: Option<String>,
    pub limit: Option<usize>,
}

/// Body of `POST /health/check`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckRequest {
    /// Check only this target; all targets when absent
    pub key: Option<String>,
}
