//! Swap history route handlers

use crate::error::{not_found_error, ApiResult};
use crate::models::{HistoryQuery, SuccessResponse};
use crate::state::SharedState;
use crate::store::file::normalize_path;
use crate::store::SwapHistoryEntry;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::path::Path as FsPath;
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 100;

/// Journal entries, newest first
pub async fn list_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<SuccessResponse<Vec<SwapHistoryEntry>>>> {
    let file = query.file.as_deref().map(|f| normalize_path(FsPath::new(f)));
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let entries = state.stores.history.list(file.as_deref(), limit).await;

    Ok(Json(SuccessResponse::with_data(
        format!("{} entry(ies).", entries.len()),
        entries,
    )))
}

/// Entries written by one swap request
pub async fn get_batch(
    State(state): State<SharedState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<SwapHistoryEntry>>>> {
    let entries = state.stores.history.batch(batch_id).await;
    if entries.is_empty() {
        return Err(not_found_error(format!("Batch {} not found", batch_id)));
    }

    Ok(Json(SuccessResponse::with_data(
        format!("{} entry(ies) in batch.", entries.len()),
        entries,
    )))
}
