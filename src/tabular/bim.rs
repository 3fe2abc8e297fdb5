//! BIM Document Model
//!
//! [`TabularModel`] over a TMSL `.bim` document, the JSON serialisation of
//! the tabular object tree. Edits go to a working copy; `save_changes`
//! writes the file atomically and promotes the working copy.

use super::{
    DataSourceDefinition, DataSourceObject, ExpressionObject, ModelError, PartitionObject,
    PartitionSource, RefreshType, StorageMode, TableObject, TabularModel,
};
use crate::store::file::write_bytes_atomic_blocking;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A model backed by a `.bim` file (or an in-memory document)
#[derive(Debug, Clone)]
pub struct BimModel {
    path: Option<PathBuf>,
    server: String,
    working: Value,
    committed: Value,
}

impl BimModel {
    /// Open a `.bim` file; `server` is the address the model is served from
    pub fn open(path: impl AsRef<Path>, server: impl Into<String>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        let document: Value = serde_json::from_slice(&raw)?;
        let mut model = Self::from_value(document, server)?;
        model.path = Some(path.to_path_buf());
        info!("Opened model document {}", path.display());
        Ok(model)
    }

    /// Wrap an in-memory document; commits stay in memory
    pub fn from_value(document: Value, server: impl Into<String>) -> Result<Self, ModelError> {
        if !document.get("model").map(Value::is_object).unwrap_or(false) {
            return Err(ModelError::Read("document has no 'model' object".to_string()));
        }
        Ok(Self {
            path: None,
            server: server.into(),
            committed: document.clone(),
            working: document,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Last committed document
    pub fn document(&self) -> &Value {
        &self.committed
    }

    fn model(&self) -> &Value {
        &self.working["model"]
    }

    fn array<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Value> {
        self.model()
            .get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter())
            .into_iter()
            .flatten()
    }

    fn named_mut(&mut self, collection: &str, name: &str) -> Result<&mut Value, ModelError> {
        self.working["model"]
            .get_mut(collection)
            .and_then(Value::as_array_mut)
            .and_then(|items| items.iter_mut().find(|item| name_of(item) == Some(name)))
            .ok_or_else(|| ModelError::NotFound(format!("{} '{}'", collection, name)))
    }
}

fn name_of(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

/// Expressions may be stored as one string or as an array of lines
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(lines) => Some(
            lines
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    }
}

fn names(items: Option<&Value>) -> Vec<String> {
    items
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(name_of).map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_partition(value: &Value) -> PartitionObject {
    let source = &value["source"];
    let source = match source.get("type").and_then(Value::as_str).unwrap_or("query") {
        "m" => PartitionSource::M {
            expression: text_of(&source["expression"]).unwrap_or_default(),
        },
        "entity" => PartitionSource::Entity {
            expression_source: source["expressionSource"].as_str().map(str::to_string),
            entity_name: source["entityName"].as_str().unwrap_or_default().to_string(),
        },
        "calculated" => PartitionSource::Calculated {
            expression: text_of(&source["expression"]).unwrap_or_default(),
        },
        "query" if source.is_object() => PartitionSource::Query {
            data_source: source["dataSource"].as_str().map(str::to_string),
            query: text_of(&source["query"]).unwrap_or_default(),
        },
        _ => PartitionSource::Unknown,
    };

    PartitionObject {
        name: name_of(value).unwrap_or_default().to_string(),
        mode: value["mode"]
            .as_str()
            .map(StorageMode::parse)
            .unwrap_or(StorageMode::Default),
        source,
    }
}

impl TabularModel for BimModel {
    fn name(&self) -> String {
        name_of(self.model())
            .or_else(|| name_of(&self.working))
            .unwrap_or("Model")
            .to_string()
    }

    fn server(&self) -> String {
        self.server.clone()
    }

    fn database(&self) -> String {
        self.working
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| name_of(&self.working))
            .unwrap_or_default()
            .to_string()
    }

    fn data_source_names(&self) -> Vec<String> {
        names(self.model().get("dataSources"))
    }

    fn data_source(&self, name: &str) -> Result<DataSourceObject, ModelError> {
        let raw = self
            .array("dataSources")
            .find(|ds| name_of(ds) == Some(name))
            .ok_or_else(|| ModelError::NotFound(format!("data source '{}'", name)))?;

        let definition = if raw["type"].as_str() == Some("structured") {
            let details = &raw["connectionDetails"];
            let address = details
                .get("address")
                .ok_or_else(|| ModelError::Read(format!("structured data source '{}' has no address", name)))?;
            DataSourceDefinition::Structured {
                protocol: details["protocol"].as_str().map(str::to_string),
                server: address["server"].as_str().unwrap_or_default().to_string(),
                database: address["database"].as_str().unwrap_or_default().to_string(),
            }
        } else {
            let connection_string = raw["connectionString"]
                .as_str()
                .ok_or_else(|| ModelError::Read(format!("data source '{}' has no connection string", name)))?;
            DataSourceDefinition::Provider {
                connection_string: connection_string.to_string(),
                provider: raw["provider"].as_str().map(str::to_string),
            }
        };

        Ok(DataSourceObject {
            name: name.to_string(),
            definition,
        })
    }

    fn tables(&self) -> Result<Vec<TableObject>, ModelError> {
        Ok(self
            .array("tables")
            .map(|table| TableObject {
                name: name_of(table).unwrap_or_default().to_string(),
                columns: names(table.get("columns")),
                measures: names(table.get("measures")),
                partitions: table["partitions"]
                    .as_array()
                    .map(|parts| parts.iter().map(parse_partition).collect())
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn expression_names(&self) -> Vec<String> {
        names(self.model().get("expressions"))
    }

    fn expression(&self, name: &str) -> Result<ExpressionObject, ModelError> {
        let raw = self
            .array("expressions")
            .find(|e| name_of(e) == Some(name))
            .ok_or_else(|| ModelError::NotFound(format!("expression '{}'", name)))?;
        Ok(ExpressionObject {
            name: name.to_string(),
            expression: text_of(&raw["expression"]).unwrap_or_default(),
        })
    }

    fn relationship_count(&self) -> Result<usize, ModelError> {
        Ok(self.array("relationships").count())
    }

    fn set_connection_string(&mut self, data_source: &str, value: &str) -> Result<(), ModelError> {
        let ds = self.named_mut("dataSources", data_source)?;
        if ds["type"].as_str() == Some("structured") {
            return Err(ModelError::Unsupported(format!(
                "data source '{}' is structured and has no connection string",
                data_source
            )));
        }
        ds["connectionString"] = json!(value);
        Ok(())
    }

    fn set_structured_address(
        &mut self,
        data_source: &str,
        server: &str,
        database: &str,
    ) -> Result<(), ModelError> {
        let ds = self.named_mut("dataSources", data_source)?;
        let address = ds
            .pointer_mut("/connectionDetails/address")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ModelError::Unsupported(format!("data source '{}' has no address", data_source)))?;
        address.insert("server".to_string(), json!(server));
        address.insert("database".to_string(), json!(database));
        Ok(())
    }

    fn set_expression(&mut self, name: &str, expression: &str) -> Result<(), ModelError> {
        let raw = self.named_mut("expressions", name)?;
        raw["expression"] = if raw["expression"].is_array() {
            json!(expression.split('\n').collect::<Vec<_>>())
        } else {
            json!(expression)
        };
        Ok(())
    }

    fn save_changes(&mut self) -> Result<(), ModelError> {
        if let Some(path) = &self.path {
            let bytes = serde_json::to_vec_pretty(&self.working)?;
            write_bytes_atomic_blocking(path, &bytes)
                .map_err(|e| ModelError::Commit(format!("{}: {}", path.display(), e)))?;
            debug!("Committed model document to {}", path.display());
        }
        self.committed = self.working.clone();
        Ok(())
    }

    fn undo_local_changes(&mut self) {
        self.working = self.committed.clone();
    }

    fn request_refresh(&mut self, refresh: RefreshType) -> Result<(), ModelError> {
        match refresh {
            RefreshType::Calculate => {
                debug!("Metadata refresh requested for document model '{}'", self.name());
                Ok(())
            }
            RefreshType::Full => Err(ModelError::Unsupported(
                "a document model holds no data to refresh".to_string(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A small composite model used across the crate's tests
    pub(crate) fn sample_document() -> Value {
        json!({
            "name": "AAAA-BBBB",
            "compatibilityLevel": 1567,
            "model": {
                "name": "Sales",
                "dataSources": [
                    {
                        "name": "Warehouse",
                        "connectionString": "Provider=MSOLAP.8;Data Source=localhost:52700;Initial Catalog=AAAA-BBBB",
                        "provider": "MSOLAP"
                    }
                ],
                "tables": [
                    {
                        "name": "Orders",
                        "columns": [{ "name": "OrderId" }, { "name": "Amount" }],
                        "measures": [{ "name": "Total Sales", "expression": "SUM(Orders[Amount])" }],
                        "partitions": [
                            { "name": "Orders", "mode": "directQuery",
                              "source": { "type": "query", "dataSource": "Warehouse", "query": "SELECT * FROM Orders" } }
                        ]
                    }
                ],
                "relationships": []
            }
        })
    }

    #[test]
    fn test_reads_provider_data_source() {
        let model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        assert_eq!(model.name(), "Sales");
        assert_eq!(model.database(), "AAAA-BBBB");
        assert_eq!(model.data_source_names(), vec!["Warehouse"]);

        let ds = model.data_source("Warehouse").unwrap();
        match ds.definition {
            DataSourceDefinition::Provider { connection_string, provider } => {
                assert!(connection_string.contains("Data Source=localhost:52700"));
                assert_eq!(provider.as_deref(), Some("MSOLAP"));
            }
            other => panic!("unexpected definition {:?}", other),
        }
    }

    #[test]
    fn test_expression_lines_round_trip_shape() {
        let mut doc = sample_document();
        doc["model"]["expressions"] = json!([
            { "name": "Source", "kind": "m", "expression": ["let", "  x = 1", "in", "  x"] }
        ]);
        let mut model = BimModel::from_value(doc, "localhost").unwrap();
        assert_eq!(model.expression("Source").unwrap().expression, "let\n  x = 1\nin\n  x");

        model.set_expression("Source", "let\n  y = 2\nin\n  y").unwrap();
        model.save_changes().unwrap();
        assert!(model.document()["model"]["expressions"][0]["expression"].is_array());
    }

    #[test]
    fn test_undo_discards_uncommitted_edits() {
        let mut model = BimModel::from_value(sample_document(), "localhost").unwrap();
        model.set_connection_string("Warehouse", "Data Source=elsewhere").unwrap();
        model.undo_local_changes();

        let ds = model.data_source("Warehouse").unwrap();
        assert!(matches!(
            ds.definition,
            DataSourceDefinition::Provider { ref connection_string, .. } if connection_string.contains("localhost:52700")
        ));
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bim");
        std::fs::write(&path, serde_json::to_vec(&sample_document()).unwrap()).unwrap();

        let mut model = BimModel::open(&path, "localhost:52700").unwrap();
        model.set_connection_string("Warehouse", "Data Source=other;Initial Catalog=X").unwrap();
        model.save_changes().unwrap();

        let reopened = BimModel::open(&path, "localhost:52700").unwrap();
        let ds = reopened.data_source("Warehouse").unwrap();
        assert!(matches!(
            ds.definition,
            DataSourceDefinition::Provider { ref connection_string, .. } if connection_string == "Data Source=other;Initial Catalog=X"
        ));
    }

    #[test]
    fn test_missing_model_object_is_rejected() {
        assert!(BimModel::from_value(json!({ "name": "x" }), "localhost").is_err());
    }
}
