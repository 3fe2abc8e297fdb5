//! Swap Presets
//!
//! Named sets of `connection name -> target` pairs. A *global* preset holds
//! a single target applied to any model with exactly one swappable live
//! connection; a *model* preset is bound to the identity hash of one model,
//! which ignores everything a swap rewrites. Presets live in the user profile or next to the project.

use super::file::{load_document, save_document};
use super::{project_dir_for, StoreError, PRESETS_FILE};
use crate::connection::{ConnectionKind, ModelConnectionInfo, SwapTarget};
use crate::schema::SchemaInfo;
use crate::tabular::{ModelError, TabularModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetScope {
    Global,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Per-user application data directory
    User,
    /// Next to the model file
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetMapping {
    pub connection_name: String,
    pub target: SwapTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPreset {
    pub name: String,
    pub scope: PresetScope,
    pub storage_type: StorageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    pub mappings: Vec<PresetMapping>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapPreset {
    pub fn global(name: impl Into<String>, target: SwapTarget, storage_type: StorageType) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            scope: PresetScope::Global,
            storage_type,
            model_hash: None,
            model_path: None,
            mappings: vec![PresetMapping {
                connection_name: "*".to_string(),
                target,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_model(
        name: impl Into<String>,
        model_hash: impl Into<String>,
        model_path: Option<String>,
        mappings: Vec<PresetMapping>,
        storage_type: StorageType,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            scope: PresetScope::Model,
            storage_type,
            model_hash: Some(model_hash.into()),
            model_path,
            mappings,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Why a preset cannot be applied to a model
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PresetError {
    #[error("Preset '{preset}' belongs to a different model")]
    ModelMismatch { preset: String },

    #[error("Global preset needs exactly one swappable live connection, found {0}")]
    NotSingleLiveConnection(usize),

    #[error("Connection '{0}' from the preset does not exist in this model")]
    MissingConnection(String),

    #[error("Preset '{0}' has no mappings")]
    Empty(String),
}

/// SHA-256 over the model name and its structural checksum.
///
/// Data sources and expressions are not part of it, so the hash is stable
/// across swaps of the same model.
pub fn model_identity_hash(model: &dyn TabularModel) -> Result<String, ModelError> {
    let schema = SchemaInfo::extract(model)?;
    let mut hasher = Sha256::new();
    hasher.update(model.name().as_bytes());
    hasher.update(b"|");
    hasher.update(schema.checksum.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Connection/target pairs a preset yields for `info`.
///
/// Rejects before any swap is attempted when scope rules are not met.
pub fn resolve_preset(
    preset: &SwapPreset,
    info: &ModelConnectionInfo,
    model_hash: Option<&str>,
) -> Result<Vec<(String, SwapTarget)>, PresetError> {
    if preset.mappings.is_empty() {
        return Err(PresetError::Empty(preset.name.clone()));
    }

    match preset.scope {
        PresetScope::Model => {
            if preset.model_hash.is_none() || preset.model_hash.as_deref() != model_hash {
                return Err(PresetError::ModelMismatch {
                    preset: preset.name.clone(),
                });
            }
            preset
                .mappings
                .iter()
                .map(|m| {
                    info.find(&m.connection_name)
                        .map(|c| (c.name.clone(), m.target.clone()))
                        .ok_or_else(|| PresetError::MissingConnection(m.connection_name.clone()))
                })
                .collect()
        }
        PresetScope::Global => {
            let live: Vec<_> = info
                .connections
                .iter()
                .filter(|c| c.kind == ConnectionKind::Live && c.is_swappable())
                .collect();
            if live.len() != 1 {
                return Err(PresetError::NotSingleLiveConnection(live.len()));
            }
            Ok(vec![(live[0].name.clone(), preset.mappings[0].target.clone())])
        }
    }
}

type PresetMap = BTreeMap<String, SwapPreset>;

pub struct PresetStore {
    user_path: PathBuf,
    user: RwLock<PresetMap>,
}

impl PresetStore {
    pub async fn load(user_path: PathBuf) -> Self {
        let user: PresetMap = load_document(&user_path).await;
        Self {
            user_path,
            user: RwLock::new(user),
        }
    }

    fn project_path(model_path: Option<&Path>) -> Result<PathBuf, StoreError> {
        model_path
            .map(|p| project_dir_for(p).join(PRESETS_FILE))
            .ok_or_else(|| StoreError::Invalid("project presets need an open model file".to_string()))
    }

    /// Create or update; keeps the original creation time
    pub async fn save(&self, mut preset: SwapPreset, model_path: Option<&Path>) -> Result<SwapPreset, StoreError> {
        if preset.name.trim().is_empty() {
            return Err(StoreError::Invalid("preset name is required".to_string()));
        }
        preset.updated_at = Utc::now();

        match preset.storage_type {
            StorageType::User => {
                let mut user = self.user.write().await;
                if let Some(existing) = user.get(&preset.name) {
                    preset.created_at = existing.created_at;
                }
                let mut updated = user.clone();
                updated.insert(preset.name.clone(), preset.clone());
                save_document(&self.user_path, &updated).await?;
                *user = updated;
            }
            StorageType::Project => {
                let path = Self::project_path(model_path)?;
                let mut project: PresetMap = load_document(&path).await;
                if let Some(existing) = project.get(&preset.name) {
                    preset.created_at = existing.created_at;
                }
                project.insert(preset.name.clone(), preset.clone());
                save_document(&path, &project).await?;
            }
        }

        info!("Saved {:?} preset '{}'", preset.storage_type, preset.name);
        Ok(preset)
    }

    /// User presets plus project presets of `model_path`; project wins on name clash
    pub async fn list(&self, model_path: Option<&Path>) -> Vec<SwapPreset> {
        let mut all: PresetMap = self.user.read().await.clone();
        if let Ok(path) = Self::project_path(model_path) {
            let project: PresetMap = load_document(&path).await;
            all.extend(project);
        }
        all.into_values().collect()
    }

    pub async fn get(&self, name: &str, model_path: Option<&Path>) -> Option<SwapPreset> {
        if let Ok(path) = Self::project_path(model_path) {
            let mut project: PresetMap = load_document(&path).await;
            if let Some(preset) = project.remove(name) {
                return Some(preset);
            }
        }
        self.user.read().await.get(name).cloned()
    }

    pub async fn delete(
        &self,
        name: &str,
        storage_type: StorageType,
        model_path: Option<&Path>,
    ) -> Result<bool, StoreError> {
        let removed = match storage_type {
            StorageType::User => {
                let mut user = self.user.write().await;
                let mut updated = user.clone();
                let removed = updated.remove(name).is_some();
                if removed {
                    save_document(&self.user_path, &updated).await?;
                    *user = updated;
                }
                removed
            }
            StorageType::Project => {
                let path = Self::project_path(model_path)?;
                let mut project: PresetMap = load_document(&path).await;
                let removed = project.remove(name).is_some();
                if removed {
                    save_document(&path, &project).await?;
                }
                removed
            }
        };
        if removed {
            info!("Deleted {:?} preset '{}'", storage_type, name);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::local_connection;
    use crate::connection::ModelKind;

    fn info_with(connections: Vec<crate::connection::DataSourceConnection>) -> ModelConnectionInfo {
        ModelConnectionInfo {
            model_name: "Sales".to_string(),
            server: "localhost:52700".to_string(),
            database: "AAAA-BBBB".to_string(),
            connection_kind: ModelKind::Live,
            is_composite: connections.len() > 1,
            connections,
        }
    }

    fn cloud_target() -> SwapTarget {
        SwapTarget::cloud("powerbi://api.powerbi.com/v1.0/myorg/Sales", "SalesModel")
    }

    #[test]
    fn test_model_preset_rejects_other_model() {
        let info = info_with(vec![local_connection()]);
        let preset = SwapPreset::for_model(
            "prod",
            "hash-a",
            None,
            vec![PresetMapping {
                connection_name: "Warehouse".to_string(),
                target: cloud_target(),
            }],
            StorageType::User,
        );

        assert_eq!(
            resolve_preset(&preset, &info, Some("hash-b")),
            Err(PresetError::ModelMismatch {
                preset: "prod".to_string()
            })
        );
        let pairs = resolve_preset(&preset, &info, Some("hash-a")).unwrap();
        assert_eq!(pairs[0].0, "Warehouse");
    }

    #[test]
    fn test_global_and_model_presets_are_not_interchangeable() {
        let info = info_with(vec![local_connection()]);
        let global = SwapPreset::global("any", cloud_target(), StorageType::User);
        let mut model = global.clone();
        model.scope = PresetScope::Model;

        assert!(resolve_preset(&global, &info, Some("hash")).is_ok());
        assert!(matches!(
            resolve_preset(&model, &info, Some("hash")),
            Err(PresetError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_global_preset_requires_single_live_connection() {
        let mut second = local_connection();
        second.name = "Second".to_string();
        let info = info_with(vec![local_connection(), second]);
        let preset = SwapPreset::global("any", cloud_target(), StorageType::User);

        assert_eq!(
            resolve_preset(&preset, &info, None),
            Err(PresetError::NotSingleLiveConnection(2))
        );
    }

    #[tokio::test]
    async fn test_user_and_project_storage() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("work").join("model.bim");
        let store = PresetStore::load(dir.path().join("presets.json")).await;

        let user = store
            .save(SwapPreset::global("prod", cloud_target(), StorageType::User), None)
            .await
            .unwrap();
        let project = SwapPreset::global("dev", SwapTarget::local("localhost:1", "Dev"), StorageType::Project);
        assert!(store.save(project.clone(), None).await.is_err());
        store.save(project, Some(&model_path)).await.unwrap();

        assert!(dir.path().join("work").join(".tabular-hotswap").join("presets.json").exists());
        assert_eq!(store.list(Some(&model_path)).await.len(), 2);
        assert_eq!(store.list(None).await.len(), 1);

        let again = store
            .save(SwapPreset::global("prod", cloud_target(), StorageType::User), None)
            .await
            .unwrap();
        assert_eq!(again.created_at, user.created_at);

        assert!(store.delete("dev", StorageType::Project, Some(&model_path)).await.unwrap());
        assert!(store.get("dev", Some(&model_path)).await.is_none());
        assert!(!store.delete("missing", StorageType::User, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_user_save_is_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = PresetStore::load(blocker.join("presets.json")).await;

        let result = store
            .save(SwapPreset::global("prod", cloud_target(), StorageType::User), None)
            .await;
        assert!(result.is_err());
        assert!(store.list(None).await.is_empty());
        assert!(store.get("prod", None).await.is_none());
    }

    #[test]
    fn test_identity_hash_survives_a_swap() {
        use crate::tabular::bim::tests::sample_document;
        use crate::tabular::BimModel;

        let mut model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        let before = model_identity_hash(&model).unwrap();

        model
            .set_connection_string("Warehouse", "Provider=MSOLAP;Data Source=powerbi://x/myorg/Dev;Initial Catalog=Dev")
            .unwrap();
        model.save_changes().unwrap();
        assert_eq!(model_identity_hash(&model).unwrap(), before);

        let mut other = sample_document();
        other["model"]["tables"][0]["columns"][1]["name"] = serde_json::json!("Quantity");
        let other = BimModel::from_value(other, "localhost:52700").unwrap();
        assert_ne!(model_identity_hash(&other).unwrap(), before);
    }
}
