//! Preset DTOs

use crate::store::{PresetMapping, PresetScope, StorageType};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Create or update a preset
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SavePresetRequest {
    #[validate(length(min = 1, max = 100, message = "Preset name must be between 1 and 100 characters"))]
    pub name: String,

    pub scope: PresetScope,

    #[serde(default = "default_storage")]
    pub storage_type: StorageType,

    #[validate(length(min = 1, message = "At least one mapping is required"))]
    #[validate(custom(function = "validate_mappings"))]
    pub mappings: Vec<PresetMapping>,
}

fn default_storage() -> StorageType {
    StorageType::User
}

fn validate_mappings(mappings: &[PresetMapping]) -> Result<(), ValidationError> {
    for mapping in mappings {
        super::validate_target(&mapping.target)?;
    }
    Ok(())
}

/// Query selecting the storage a preset is deleted from
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetLocationQuery {
    #[serde(default = "default_storage")]
    pub storage_type: StorageType,
}

/// Body of `POST /presets/{name}/apply`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPresetRequest {
    #[serde(default)]
    pub confirm: bool,
}
