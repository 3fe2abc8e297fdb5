//! Model session route handlers
//!
//! Opening a model, reading its connections and validating a target.

use crate::error::{validation_error, ApiResult, AppError};
use crate::models::{OpenModelRequest, SessionView, SuccessResponse, ValidateRequest};
use crate::schema::{SchemaValidator, ValidationResult};
use crate::state::{ModelSession, SharedState};
use crate::tabular::{run_blocking, BimModel, TabularModel};
use axum::{extract::State, Json};
use std::path::PathBuf;
use tracing::{debug, info};
use validator::Validate;

const DEFAULT_SERVER: &str = "localhost";

fn view(session: &ModelSession) -> SessionView {
    SessionView {
        path: session.path.display().to_string(),
        model_hash: session.model_hash.clone(),
        info: session.detect().summary(),
        mappings: session.mappings.values().cloned().collect(),
    }
}

/// Open a `.bim` document and detect its connections
pub async fn open_model(
    State(state): State<SharedState>,
    Json(payload): Json<OpenModelRequest>,
) -> ApiResult<Json<SuccessResponse<SessionView>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let path = PathBuf::from(&payload.path);
    let server = payload.server.unwrap_or_else(|| DEFAULT_SERVER.to_string());
    debug!("Opening model {} served from {}", path.display(), server);

    let open_path = path.clone();
    let model = tokio::task::spawn_blocking(move || BimModel::open(open_path, server))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let session = ModelSession::new(Box::new(model), path);
    let view = view(&session);
    info!(
        "Opened model '{}' with {} connection(s), {} swappable",
        view.info.model_name, view.info.total_count, view.info.swappable_count
    );

    *state.session.lock().await = Some(session);

    Ok(Json(SuccessResponse::with_data(
        format!("Opened model '{}'.", view.info.model_name),
        view,
    )))
}

/// Current connections and mappings of the open model
pub async fn get_connections(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<SessionView>>> {
    let guard = state.session.lock().await;
    let session = guard
        .as_ref()
        .ok_or_else(|| AppError::NotConnected("Open a model first".to_string()))?;
    let view = view(session);

    Ok(Json(SuccessResponse::with_data(
        format!("{} connection(s).", view.info.total_count),
        view,
    )))
}

/// Compare the source schema with a candidate target
pub async fn validate(
    State(state): State<SharedState>,
    Json(payload): Json<ValidateRequest>,
) -> ApiResult<Json<SuccessResponse<ValidationResult>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let guard = state.session.lock().await;
    let session = guard
        .as_ref()
        .ok_or_else(|| AppError::NotConnected("Open a model first".to_string()))?;

    let mut mapping = session.mapping(&payload.connection_name)?.clone();
    mapping.set_target(payload.target, false);

    let validator = SchemaValidator::new(state.connector());
    let model: &dyn TabularModel = session.model.as_ref();
    let result = run_blocking(|| validator.validate(model, &mapping));

    let message = if result.is_compatible {
        "Target is compatible."
    } else {
        "Target has blocking schema differences."
    };
    Ok(Json(SuccessResponse::with_data(message, result)))
}
