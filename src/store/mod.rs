//! Persistent Stores
//!
//! The only writers to disk. Each store keeps an in-memory copy behind a
//! lock and rewrites its JSON document atomically on every change:
//! - Connection cache (original cloud payloads + schema fingerprints)
//! - Swap presets (user profile or project-local)
//! - Swap history journal

pub mod cache;
pub mod file;
pub mod history;
pub mod presets;

pub use cache::{CacheEntry, CacheStore, CloudConnectionPayload};
pub use history::{EndpointLabel, HistoryOperation, HistoryStore, SwapHistoryEntry};
pub use presets::{
    model_identity_hash, resolve_preset, PresetError, PresetMapping, PresetScope, PresetStore, StorageType, SwapPreset,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid store request: {0}")]
    Invalid(String),
}

/// File names inside the data directory
pub const CACHE_FILE: &str = "connection_cache.json";
pub const PRESETS_FILE: &str = "presets.json";
pub const HISTORY_FILE: &str = "swap_history.json";

/// Directory for project-local files, created next to the model
pub const PROJECT_DIR_NAME: &str = ".tabular-hotswap";

/// All stores of one application context
pub struct Stores {
    pub cache: CacheStore,
    pub presets: PresetStore,
    pub history: std::sync::Arc<HistoryStore>,
}

impl Stores {
    /// Load every store from `data_dir`
    pub async fn load(data_dir: &Path) -> Self {
        Self {
            cache: CacheStore::load(data_dir.join(CACHE_FILE)).await,
            presets: PresetStore::load(data_dir.join(PRESETS_FILE)).await,
            history: std::sync::Arc::new(HistoryStore::load(data_dir.join(HISTORY_FILE)).await),
        }
    }
}

/// Project-local directory for a model file
pub fn project_dir_for(model_path: &Path) -> PathBuf {
    model_path
        .parent()
        .map(|p| p.join(PROJECT_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(PROJECT_DIR_NAME))
}
