//! Application state management
//!
//! Contains shared state accessible across all handlers. Every service is
//! constructed once here and handed to handlers explicitly.

use crate::config::Settings;
use crate::connection::{ConnectionMapping, ModelConnectionInfo};
use crate::detector::ConnectionDetector;
use crate::error::{not_found_error, AppError};
use crate::health::HealthChecker;
use crate::process::{ProcessController, SystemPlatform};
use crate::store::file::normalize_path;
use crate::store::{model_identity_hash, Stores};
use crate::swapper::ConnectionSwapper;
use crate::tabular::{BimCatalog, ModelConnector, TabularModel};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// The open model and the mappings built for it
pub struct ModelSession {
    pub model: Box<dyn TabularModel>,
    pub path: PathBuf,
    /// Structural identity hash, for model-scoped presets
    pub model_hash: Option<String>,
    pub mappings: BTreeMap<String, ConnectionMapping>,
}

impl ModelSession {
    pub fn new(model: Box<dyn TabularModel>, path: PathBuf) -> Self {
        let model_hash = match model_identity_hash(model.as_ref()) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Cannot hash model '{}': {}", model.name(), e);
                None
            }
        };
        let info = ConnectionDetector::detect(model.as_ref());
        let mappings = info
            .connections
            .into_iter()
            .map(|c| (c.name.clone(), ConnectionMapping::new(c)))
            .collect();
        Self {
            model,
            path,
            model_hash,
            mappings,
        }
    }

    /// Fresh detection snapshot of the live model
    pub fn detect(&self) -> ModelConnectionInfo {
        ConnectionDetector::detect(self.model.as_ref())
    }

    /// Store key of the model file
    pub fn file_key(&self) -> String {
        normalize_path(&self.path)
    }

    pub fn mapping(&self, name: &str) -> Result<&ConnectionMapping, AppError> {
        self.mappings
            .get(name)
            .ok_or_else(|| not_found_error(format!("Connection '{}' not found", name)))
    }
}

/// Application state shared across all handlers
pub struct AppState {
    /// One open model at a time; the lock serializes swaps against it
    pub session: Mutex<Option<ModelSession>>,

    pub health: HealthChecker,

    pub stores: Stores,

    /// Local `.bim` catalog used to compare target schemas
    pub catalog: Option<BimCatalog>,

    pub process: ProcessController,

    pub swapper: ConnectionSwapper,
}

impl AppState {
    pub async fn new(settings: &Settings) -> Self {
        let stores = Stores::load(&settings.engine.data_dir).await;
        let swapper = ConnectionSwapper::new(Some(stores.history.clone()));

        Self {
            session: Mutex::new(None),
            health: HealthChecker::new(settings.engine.health()),
            catalog: settings.engine.catalog_dir.clone().map(BimCatalog::new),
            process: ProcessController::new(Arc::new(SystemPlatform), settings.engine.process()),
            swapper,
            stores,
        }
    }

    pub fn connector(&self) -> Option<&dyn ModelConnector> {
        self.catalog.as_ref().map(|c| c as &dyn ModelConnector)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
