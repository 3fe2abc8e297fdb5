//! Swap and rollback route handlers
//!
//! Every handler here holds the session lock for the whole request, so
//! swaps against the open model never interleave.

use crate::connection::SwapTarget;
use crate::error::{conflict_error, validation_error, ApiResult, AppError};
use crate::models::{RollbackRequest, SuccessResponse, SwapBatchResponse, SwapRequest};
use crate::state::{AppState, ModelSession, SharedState};
use crate::swapper::SwapContext;
use axum::{extract::State, Json};
use tracing::{debug, info, warn};
use validator::Validate;

/// Refuse targets whose last health check failed unless the caller confirmed
async fn check_health_gate(state: &AppState, targets: &[&SwapTarget], confirm: bool) -> ApiResult<()> {
    if confirm {
        return Ok(());
    }
    for target in targets {
        let key = target.key();
        if let Some(status) = state.health.status(&key).await {
            if status.is_failing() {
                return Err(conflict_error(format!(
                    "Target {} is {:?}; resend with confirm to swap anyway",
                    key, status
                )));
            }
        }
    }
    Ok(())
}

/// Run a batch of swaps against the open session.
///
/// Every connection name is checked before the first mutation. A `None`
/// target keeps whatever target the mapping already carries.
pub(crate) async fn run_swaps(
    state: &AppState,
    session: &mut ModelSession,
    requested: Vec<(String, Option<SwapTarget>)>,
    confirm: bool,
) -> ApiResult<SwapBatchResponse> {
    for (name, target) in &requested {
        let mapping = session.mapping(name)?;
        if target.is_none() && mapping.target.is_none() {
            return Err(validation_error(format!("Connection '{}' has no target", name)));
        }
    }

    let targets: Vec<&SwapTarget> = requested
        .iter()
        .filter_map(|(name, target)| {
            target
                .as_ref()
                .or_else(|| session.mappings.get(name).and_then(|m| m.target.as_ref()))
        })
        .collect();
    check_health_gate(state, &targets, confirm).await?;

    let ctx = SwapContext::new(Some(session.file_key()));
    let ModelSession { model, mappings, .. } = session;
    let mut results = Vec::with_capacity(requested.len());

    for (name, target) in requested {
        let mapping = mappings
            .get_mut(&name)
            .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", name)))?;
        if let Some(target) = target {
            mapping.set_target(target, false);
        }
        debug!("Swapping '{}' in batch {}", name, ctx.batch_id);
        let result = state.swapper.swap(model.as_mut(), mapping, &ctx).await;
        if !result.success {
            warn!("Swap of '{}' failed: {}", name, result.message);
        }
        results.push(result);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    info!(
        batch_id = %ctx.batch_id,
        succeeded,
        failed,
        "Swap batch finished"
    );

    Ok(SwapBatchResponse {
        batch_id: ctx.batch_id,
        succeeded,
        failed,
        results,
    })
}

/// Swap one or more connections of the open model
pub async fn swap(
    State(state): State<SharedState>,
    Json(payload): Json<SwapRequest>,
) -> ApiResult<Json<SuccessResponse<SwapBatchResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let mut guard = state.session.lock().await;
    let session = guard
        .as_mut()
        .ok_or_else(|| AppError::NotConnected("Open a model first".to_string()))?;

    let requested = payload
        .mappings
        .into_iter()
        .map(|m| (m.connection_name, m.target))
        .collect();
    let batch = run_swaps(&state, session, requested, payload.confirm).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{} swapped, {} failed.", batch.succeeded, batch.failed),
        batch,
    )))
}

/// Return a connection to the values it had before its first swap
pub async fn rollback(
    State(state): State<SharedState>,
    Json(payload): Json<RollbackRequest>,
) -> ApiResult<Json<SuccessResponse<SwapBatchResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let mut guard = state.session.lock().await;
    let session = guard
        .as_mut()
        .ok_or_else(|| AppError::NotConnected("Open a model first".to_string()))?;
    session.mapping(&payload.connection_name)?;

    let ctx = SwapContext::new(Some(session.file_key()));
    let ModelSession { model, mappings, .. } = session;
    let mapping = mappings
        .get_mut(&payload.connection_name)
        .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", payload.connection_name)))?;

    let result = state.swapper.rollback(model.as_mut(), mapping, &ctx).await;
    let message = result.message.clone();
    let succeeded = usize::from(result.success);

    Ok(Json(SuccessResponse::with_data(
        message,
        SwapBatchResponse {
            batch_id: ctx.batch_id,
            succeeded,
            failed: 1 - succeeded,
            results: vec![result],
        },
    )))
}
