//! Report file and host process route handlers
//!
//! These handlers may close and reopen the host application, so they can
//! take as long as the configured close and unlock timeouts.

use crate::error::{validation_error, ApiResult};
use crate::models::{
    MessageResponse, ReportRestoreRequest, ReportSwapRequest, SuccessResponse, TerminateRequest,
};
use crate::report::{definition_path, ReportSwapOutcome, ReportSwapWorkflow};
use crate::state::SharedState;
use axum::{extract::State, Json};
use std::path::Path;
use tracing::{info, warn};
use validator::Validate;

fn workflow(state: &SharedState) -> ReportSwapWorkflow<'_> {
    ReportSwapWorkflow::new(&state.stores.cache, &state.stores.history, &state.process)
}

fn outcome_message(action: &str, outcome: &ReportSwapOutcome) -> String {
    if outcome.workflow.success {
        format!("Report {}: {}", action, outcome.workflow.message)
    } else {
        format!(
            "Report {} stopped at {:?}: {}",
            action, outcome.workflow.failed_step, outcome.workflow.message
        )
    }
}

/// Point a report at a new dataset
pub async fn swap_report(
    State(state): State<SharedState>,
    Json(payload): Json<ReportSwapRequest>,
) -> ApiResult<Json<SuccessResponse<ReportSwapOutcome>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let path = definition_path(Path::new(&payload.path));
    info!("Retargeting report {} to {}", path.display(), payload.target.server);

    let outcome = workflow(&state)
        .swap(&path, &payload.target, payload.pid, payload.options)
        .await?;
    if !outcome.workflow.success {
        warn!("Report swap of {} failed: {}", path.display(), outcome.workflow.message);
    }

    Ok(Json(SuccessResponse::with_data(
        outcome_message("swap", &outcome),
        outcome,
    )))
}

/// Put back the connection the report had before its first swap
pub async fn restore_report(
    State(state): State<SharedState>,
    Json(payload): Json<ReportRestoreRequest>,
) -> ApiResult<Json<SuccessResponse<ReportSwapOutcome>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let path = definition_path(Path::new(&payload.path));
    let outcome = workflow(&state)
        .restore(&path, payload.pid, payload.options)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        outcome_message("restore", &outcome),
        outcome,
    )))
}

/// Kill a host process that will not close on request
pub async fn terminate_process(
    State(state): State<SharedState>,
    Json(payload): Json<TerminateRequest>,
) -> ApiResult<Json<MessageResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    state.process.force_terminate(payload.pid).await?;

    Ok(Json(MessageResponse::new(format!(
        "Process {} terminated.",
        payload.pid
    ))))
}
