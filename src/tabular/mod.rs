//! Tabular Model Management API
//!
//! The live model handle the engine reads and mutates. The vendor API is
//! expressed as the [`TabularModel`] trait; every object is addressed by its
//! stable name and re-resolved on each call, never through a cached pointer.

pub mod bim;
pub mod catalog;

pub use bim::BimModel;
pub use catalog::{BimCatalog, ModelConnector};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Errors raised by the management API
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Failed to read model object: {0}")]
    Read(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model document: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a data source describes its endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataSourceDefinition {
    /// Flat connection string (legacy provider data source)
    Provider {
        connection_string: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    /// Structured endpoint with an address sub-object
    Structured {
        #[serde(skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
        server: String,
        database: String,
    },
}

/// A top-level data source of the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceObject {
    pub name: String,
    pub definition: DataSourceDefinition,
}

/// Partition storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageMode {
    Import,
    DirectQuery,
    Dual,
    Default,
}

impl StorageMode {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "import" => StorageMode::Import,
            "directquery" => StorageMode::DirectQuery,
            "dual" => StorageMode::Dual,
            _ => StorageMode::Default,
        }
    }
}

/// Where a partition gets its rows from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PartitionSource {
    Query {
        #[serde(skip_serializing_if = "Option::is_none")]
        data_source: Option<String>,
        query: String,
    },
    M {
        expression: String,
    },
    Entity {
        #[serde(skip_serializing_if = "Option::is_none")]
        expression_source: Option<String>,
        entity_name: String,
    },
    Calculated {
        expression: String,
    },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionObject {
    pub name: String,
    pub mode: StorageMode,
    pub source: PartitionSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableObject {
    pub name: String,
    pub columns: Vec<String>,
    pub measures: Vec<String>,
    pub partitions: Vec<PartitionObject>,
}

impl TableObject {
    /// A calculated table is one whose partitions are all DAX-calculated
    pub fn is_calculated(&self) -> bool {
        !self.partitions.is_empty()
            && self
                .partitions
                .iter()
                .all(|p| matches!(p.source, PartitionSource::Calculated { .. }))
    }
}

/// A shared (named) M expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionObject {
    pub name: String,
    pub expression: String,
}

/// Refresh types accepted by [`TabularModel::request_refresh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshType {
    /// Metadata only, no data is processed
    Calculate,
    Full,
}

/// The live model handle.
///
/// Implementations are not assumed re-entrant: callers serialize access to a
/// single handle. Mutations are held in memory until [`save_changes`] commits
/// them.
///
/// [`save_changes`]: TabularModel::save_changes
pub trait TabularModel: Send {
    fn name(&self) -> String;
    fn server(&self) -> String;
    fn database(&self) -> String;

    fn data_source_names(&self) -> Vec<String>;
    fn data_source(&self, name: &str) -> Result<DataSourceObject, ModelError>;

    fn tables(&self) -> Result<Vec<TableObject>, ModelError>;

    fn expression_names(&self) -> Vec<String>;
    fn expression(&self, name: &str) -> Result<ExpressionObject, ModelError>;

    fn relationship_count(&self) -> Result<usize, ModelError>;

    fn set_connection_string(&mut self, data_source: &str, value: &str) -> Result<(), ModelError>;
    fn set_structured_address(
        &mut self,
        data_source: &str,
        server: &str,
        database: &str,
    ) -> Result<(), ModelError>;
    fn set_expression(&mut self, name: &str, expression: &str) -> Result<(), ModelError>;

    /// Persist pending changes; the only durable mutation
    fn save_changes(&mut self) -> Result<(), ModelError>;

    /// Drop uncommitted edits
    fn undo_local_changes(&mut self);

    fn request_refresh(&mut self, refresh: RefreshType) -> Result<(), ModelError>;
}

/// Run model file I/O from async code.
///
/// On a multi-threaded runtime the worker is handed off first so other
/// tasks keep running; elsewhere `f` runs inline.
pub fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_blocking_outside_a_runtime() {
        assert_eq!(run_blocking(|| 7), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_blocking_on_worker_threads() {
        let value = String::from("saved");
        assert_eq!(run_blocking(|| value.len()), 5);
    }

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!(StorageMode::parse("directQuery"), StorageMode::DirectQuery);
        assert_eq!(StorageMode::parse("Import"), StorageMode::Import);
        assert_eq!(StorageMode::parse("dual"), StorageMode::Dual);
        assert_eq!(StorageMode::parse(""), StorageMode::Default);
    }

    #[test]
    fn test_calculated_table_detection() {
        let table = TableObject {
            name: "Dates".to_string(),
            columns: vec!["Date".to_string()],
            measures: vec![],
            partitions: vec![PartitionObject {
                name: "Dates".to_string(),
                mode: StorageMode::Import,
                source: PartitionSource::Calculated {
                    expression: "CALENDARAUTO()".to_string(),
                },
            }],
        };
        assert!(table.is_calculated());

        let empty = TableObject {
            partitions: vec![],
            ..table
        };
        assert!(!empty.is_calculated());
    }
}
