//! Report file and host process DTOs

use super::validate_target;
use crate::connection::SwapTarget;
use crate::process::WorkflowOptions;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportSwapRequest {
    /// `definition.pbir` or the report folder containing it
    #[validate(length(min = 1, message = "Report path is required"))]
    pub path: String,

    #[validate(custom(function = "validate_target"))]
    pub target: SwapTarget,

    /// Host process holding the report open
    pub pid: Option<u32>,

    #[serde(flatten)]
    pub options: WorkflowOptions,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportRestoreRequest {
    #[validate(length(min = 1, message = "Report path is required"))]
    pub path: String,

    pub pid: Option<u32>,

    #[serde(flatten)]
    pub options: WorkflowOptions,
}

/// Kill a host process; unsaved work is lost
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TerminateRequest {
    #[validate(range(min = 1, message = "A process id is required"))]
    pub pid: u32,
}
