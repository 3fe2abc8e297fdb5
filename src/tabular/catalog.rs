//! Model Catalog
//!
//! Opens a *different* model by `(server, database)`, used by the schema
//! validator to read a local target's tree.

use super::{BimModel, ModelError, TabularModel};
use std::path::PathBuf;
use tracing::debug;

/// Opens models other than the one currently being edited
pub trait ModelConnector: Send + Sync {
    fn open(&self, server: &str, database: &str) -> Result<Box<dyn TabularModel>, ModelError>;
}

/// Resolves local targets to `.bim` files in a directory.
///
/// A file matches when its stem equals the database name, or when its
/// top-level `name`/`id` does.
pub struct BimCatalog {
    root: PathBuf,
}

impl BimCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self) -> Result<Vec<PathBuf>, ModelError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("bim") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl ModelConnector for BimCatalog {
    fn open(&self, server: &str, database: &str) -> Result<Box<dyn TabularModel>, ModelError> {
        let files = self.candidates()?;

        if let Some(path) = files
            .iter()
            .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(database))
        {
            return Ok(Box::new(BimModel::open(path, server)?));
        }

        for path in &files {
            match BimModel::open(path, server) {
                Ok(model) if model.database() == database => return Ok(Box::new(model)),
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable catalog entry {}: {}", path.display(), e),
            }
        }

        Err(ModelError::NotFound(format!(
            "no catalog model for database '{}' under {}",
            database,
            self.root.display()
        )))
    }
}
