//! Error handling module
//!
//! Provides the application-wide error type for HTTP handlers. Engine
//! errors convert into it and map onto status codes here.

use crate::process::PlatformError;
use crate::report::ReportError;
use crate::store::{PresetError, StoreError};
use crate::tabular::ModelError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Preset cannot be applied: {0}")]
    Preset(#[from] PresetError),

    #[error("No model open: {0}")]
    NotConnected(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AppError {
    /// Status code and machine-readable code
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Model(ModelError::NotFound(_)) => (StatusCode::NOT_FOUND, "MODEL_OBJECT_NOT_FOUND"),
            AppError::Model(ModelError::Io(_) | ModelError::Json(_)) => {
                (StatusCode::BAD_REQUEST, "MODEL_UNREADABLE")
            }
            AppError::Model(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_ERROR"),
            AppError::Store(StoreError::Invalid(_)) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            AppError::Platform(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PLATFORM_ERROR"),
            AppError::Report(ReportError::NotCached(_)) => (StatusCode::NOT_FOUND, "NOT_CACHED"),
            AppError::Report(ReportError::MissingConnection(_) | ReportError::Json(_)) => {
                (StatusCode::BAD_REQUEST, "REPORT_UNREADABLE")
            }
            AppError::Report(_) => (StatusCode::INTERNAL_SERVER_ERROR, "REPORT_ERROR"),
            AppError::Preset(_) => (StatusCode::CONFLICT, "PRESET_NOT_APPLICABLE"),
            AppError::NotConnected(_) => (StatusCode::BAD_REQUEST, "NOT_CONNECTED"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.classify();

        let (message, details) = if status.is_server_error() {
            error!("{}: {}", error_code, self);
            ("An internal error occurred".to_string(), Some(self.to_string()))
        } else {
            (self.to_string(), None)
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}

/// Helper function to create a conflict error
pub fn conflict_error(msg: impl Into<String>) -> AppError {
    AppError::Conflict(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::NotConnected("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Model(ModelError::NotFound("ds".into())), StatusCode::NOT_FOUND),
            (AppError::Preset(PresetError::NotSingleLiveConnection(0)), StatusCode::CONFLICT),
            (AppError::Report(ReportError::NotCached("a".into())), StatusCode::NOT_FOUND),
            (conflict_error("unhealthy target"), StatusCode::CONFLICT),
            (AppError::Store(StoreError::Invalid("scope".into())), StatusCode::BAD_REQUEST),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
