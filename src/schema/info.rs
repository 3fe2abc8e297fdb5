//! Schema Extraction
//!
//! Reads the structural surface of a model: what a report bound to it can
//! reference.

use crate::tabular::{ModelError, TabularModel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Structural snapshot of a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    /// Table name -> column names
    pub tables: BTreeMap<String, BTreeSet<String>>,
    pub measures: BTreeSet<String>,
    pub relationship_count: usize,
    pub calculated_tables: BTreeSet<String>,
    pub checksum: String,
}

impl SchemaInfo {
    /// Extract the schema of an open model
    pub fn extract(model: &dyn TabularModel) -> Result<Self, ModelError> {
        let mut tables = BTreeMap::new();
        let mut measures = BTreeSet::new();
        let mut calculated_tables = BTreeSet::new();

        for table in model.tables()? {
            if table.is_calculated() {
                calculated_tables.insert(table.name.clone());
            }
            measures.extend(table.measures.iter().cloned());
            tables.insert(table.name, table.columns.into_iter().collect());
        }

        let relationship_count = model.relationship_count()?;
        let checksum = Self::compute_checksum(&tables, &measures, relationship_count);

        debug!(
            "Extracted schema of '{}': {} tables, {} measures, {} relationships",
            model.name(),
            tables.len(),
            measures.len(),
            relationship_count
        );

        Ok(Self {
            tables,
            measures,
            relationship_count,
            calculated_tables,
            checksum,
        })
    }

    /// Checksum over the sorted structural content
    pub fn compute_checksum(
        tables: &BTreeMap<String, BTreeSet<String>>,
        measures: &BTreeSet<String>,
        relationship_count: usize,
    ) -> String {
        let mut hasher = Sha256::new();
        for (table, columns) in tables {
            hasher.update(format!("T:{}", table).as_bytes());
            for column in columns {
                hasher.update(format!("C:{}.{}", table, column).as_bytes());
            }
        }
        for measure in measures {
            hasher.update(format!("M:{}", measure).as_bytes());
        }
        hasher.update(format!("R:{}", relationship_count).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(BTreeSet::len).sum()
    }
}
