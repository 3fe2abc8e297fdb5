//! Target health route handlers

use crate::connection::SwapTarget;
use crate::error::{not_found_error, validation_error, ApiResult};
use crate::health::HealthResult;
use crate::models::{validate_target, HealthCheckRequest, MessageResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

/// Latest result of every registered target
pub async fn list_targets(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<HealthResult>>>> {
    let results = state.health.all_results().await;
    Ok(Json(SuccessResponse::with_data(
        format!("{} target(s) registered.", results.len()),
        results,
    )))
}

/// Register a target for periodic checks
pub async fn register_target(
    State(state): State<SharedState>,
    Json(target): Json<SwapTarget>,
) -> ApiResult<Json<SuccessResponse<HealthResult>>> {
    validate_target(&target).map_err(|e| validation_error(e.to_string()))?;

    let key = state.health.register(target).await;
    let result = state
        .health
        .result(&key)
        .await
        .unwrap_or_else(|| HealthResult::unknown(&key));
    info!("Health target {} registered", key);

    Ok(Json(SuccessResponse::with_data(
        format!("Target '{}' registered.", key),
        result,
    )))
}

pub async fn unregister_target(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.health.unregister(&key).await {
        return Err(not_found_error(format!("Target '{}' is not registered", key)));
    }
    Ok(Json(MessageResponse::new(format!("Target '{}' unregistered.", key))))
}

/// Check one target, or all of them, right away
pub async fn check_now(
    State(state): State<SharedState>,
    payload: Option<Json<HealthCheckRequest>>,
) -> ApiResult<Json<SuccessResponse<Vec<HealthResult>>>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let results = match request.key {
        Some(key) => {
            let result = state
                .health
                .check_one(&key)
                .await
                .ok_or_else(|| not_found_error(format!("Target '{}' is not registered", key)))?;
            vec![result]
        }
        None => state.health.check_all().await,
    };

    Ok(Json(SuccessResponse::with_data(
        format!("Checked {} target(s).", results.len()),
        results,
    )))
}
