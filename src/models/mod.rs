//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains all request/response structures used by the API.

pub mod preset;
pub mod report;
pub mod swap;

// Re-export commonly used types
pub use preset::*;
pub use report::*;
pub use swap::*;

use crate::connection::SwapTarget;
use serde::Serialize;
use validator::ValidationError;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Message-only response (no data)
#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// A target needs both halves of its address
pub fn validate_target(target: &SwapTarget) -> Result<(), ValidationError> {
    if target.server.trim().is_empty() || target.database.trim().is_empty() {
        let mut error = ValidationError::new("target_address");
        error.message = Some("Target server and database are required".into());
        return Err(error);
    }
    Ok(())
}
