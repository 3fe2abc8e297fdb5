//! Preset route handlers
//!
//! Project presets live next to the open model, so listing and deleting
//! them needs a session. User presets work without one.

use super::swap::run_swaps;
use crate::error::{not_found_error, validation_error, ApiResult, AppError};
use crate::models::{
    ApplyPresetRequest, MessageResponse, PresetLocationQuery, SavePresetRequest, SuccessResponse,
    SwapBatchResponse,
};
use crate::state::SharedState;
use crate::store::{resolve_preset, PresetScope, SwapPreset};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::path::PathBuf;
use tracing::{debug, info};
use validator::Validate;

async fn open_model_path(state: &SharedState) -> Option<PathBuf> {
    state.session.lock().await.as_ref().map(|s| s.path.clone())
}

/// User presets plus the project presets of the open model
pub async fn list_presets(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<Vec<SwapPreset>>>> {
    let model_path = open_model_path(&state).await;
    let presets = state.stores.presets.list(model_path.as_deref()).await;

    Ok(Json(SuccessResponse::with_data(
        format!("{} preset(s).", presets.len()),
        presets,
    )))
}

/// Create or update a preset
pub async fn save_preset(
    State(state): State<SharedState>,
    Json(payload): Json<SavePresetRequest>,
) -> ApiResult<Json<SuccessResponse<SwapPreset>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    // Owned copies only; the session must not be borrowed across the save
    let (preset, model_path) = {
        let guard = state.session.lock().await;
        let session = guard.as_ref();

        let preset = match payload.scope {
            PresetScope::Global => {
                if payload.mappings.len() != 1 {
                    return Err(validation_error("A global preset holds exactly one target"));
                }
                let target = payload.mappings[0].target.clone();
                SwapPreset::global(payload.name, target, payload.storage_type)
            }
            PresetScope::Model => {
                let session = session
                    .ok_or_else(|| AppError::NotConnected("Model presets need an open model".to_string()))?;
                let hash = session
                    .model_hash
                    .clone()
                    .ok_or_else(|| AppError::Conflict("The open model could not be hashed".to_string()))?;
                for mapping in &payload.mappings {
                    session.mapping(&mapping.connection_name)?;
                }
                SwapPreset::for_model(
                    payload.name,
                    hash,
                    Some(session.file_key()),
                    payload.mappings,
                    payload.storage_type,
                )
            }
        };
        (preset, session.map(|s| s.path.clone()))
    };

    let saved = state.stores.presets.save(preset, model_path.as_deref()).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Preset '{}' saved.", saved.name),
        saved,
    )))
}

pub async fn delete_preset(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(location): Query<PresetLocationQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let model_path = open_model_path(&state).await;
    let removed = state
        .stores
        .presets
        .delete(&name, location.storage_type, model_path.as_deref())
        .await?;

    if !removed {
        return Err(not_found_error(format!("Preset '{}' not found", name)));
    }
    Ok(Json(MessageResponse::new(format!("Preset '{}' deleted.", name))))
}

/// Swap the open model's connections to a preset's targets
pub async fn apply_preset(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    payload: Option<Json<ApplyPresetRequest>>,
) -> ApiResult<Json<SuccessResponse<SwapBatchResponse>>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let mut guard = state.session.lock().await;
    let session = guard
        .as_mut()
        .ok_or_else(|| AppError::NotConnected("Open a model first".to_string()))?;

    let preset = state
        .stores
        .presets
        .get(&name, Some(session.path.as_path()))
        .await
        .ok_or_else(|| not_found_error(format!("Preset '{}' not found", name)))?;

    let pairs = resolve_preset(&preset, &session.detect(), session.model_hash.as_deref())?;
    debug!("Preset '{}' resolves to {} swap(s)", name, pairs.len());

    let requested = pairs.into_iter().map(|(n, t)| (n, Some(t))).collect();
    let batch = run_swaps(&state, session, requested, request.confirm).await?;
    info!("Applied preset '{}': {} swapped", name, batch.succeeded);

    Ok(Json(SuccessResponse::with_data(
        format!("Preset '{}' applied: {} swapped, {} failed.", name, batch.succeeded, batch.failed),
        batch,
    )))
}
