//! Connection Detector
//!
//! Walks the open model's metadata tree and produces a
//! [`ModelConnectionInfo`] snapshot. Three strategies run in order and the
//! first non-empty result wins: top-level data sources, shared expressions
//! bound to direct-query partitions, and finally the pure live-connection
//! model.

use crate::connection::descriptor::{
    self, has_analysis_signature, is_cloud_endpoint, parse_connection_string, workspace_from_url,
};
use crate::connection::{
    ConnectionKind, DataSourceConnection, ModelConnectionInfo, ModelKind, ObjectHandle,
    ReferenceType,
};
use crate::tabular::{
    DataSourceDefinition, DataSourceObject, PartitionSource, StorageMode, TableObject, TabularModel,
};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

pub struct ConnectionDetector;

impl ConnectionDetector {
    /// Snapshot every connection of `model`
    pub fn detect(model: &dyn TabularModel) -> ModelConnectionInfo {
        let tables = model.tables().unwrap_or_else(|e| {
            warn!("Cannot read tables of model '{}': {}", model.name(), e);
            Vec::new()
        });

        // Fallbacks only apply to models that declare no data sources at all
        let declared = model.data_source_names();
        let mut connections = Self::scan_data_sources(model, &declared, &tables);
        if declared.is_empty() {
            connections = Self::scan_bound_expressions(model, &tables);
            if connections.is_empty() {
                connections.extend(Self::live_model_connection(model, &tables));
            }
        }

        let table_modes = Self::table_modes(&tables);
        let kinds: HashSet<ConnectionKind> = connections.iter().map(|c| c.kind).collect();
        let mixed = kinds.len() > 1 || table_modes.len() > 1;

        let connection_kind = if mixed {
            ModelKind::Composite
        } else {
            kinds
                .into_iter()
                .next()
                .map(ModelKind::from)
                .unwrap_or(ModelKind::Unknown)
        };

        let info = ModelConnectionInfo {
            model_name: model.name(),
            server: model.server(),
            database: model.database(),
            connection_kind,
            is_composite: connections.len() > 1 || table_modes.len() > 1,
            connections,
        };

        info!(
            model = %info.model_name,
            total = info.total_count(),
            swappable = info.swappable_count(),
            kind = ?info.connection_kind,
            "Detected model connections"
        );
        info
    }

    fn scan_data_sources(
        model: &dyn TabularModel,
        names: &[String],
        tables: &[TableObject],
    ) -> Vec<DataSourceConnection> {
        let mut connections = Vec::new();
        for name in names {
            match model.data_source(name) {
                Ok(ds) => connections.push(Self::from_data_source(&ds, tables)),
                Err(e) => warn!("Skipping data source '{}': {}", name, e),
            }
        }
        connections
    }

    fn from_data_source(ds: &DataSourceObject, tables: &[TableObject]) -> DataSourceConnection {
        match &ds.definition {
            DataSourceDefinition::Provider {
                connection_string,
                provider,
            } => {
                let parts = parse_connection_string(connection_string);
                let provider = provider.clone().or(parts.provider.clone());
                let server = parts.server.clone().unwrap_or_default();
                let database = parts.database.clone().unwrap_or_default();
                let is_cloud = is_cloud_endpoint(&server) || is_cloud_endpoint(connection_string);

                let kind = if has_analysis_signature(provider.as_deref(), connection_string) {
                    ConnectionKind::Live
                } else {
                    Self::kind_from_partitions(&ds.name, tables).unwrap_or(ConnectionKind::DirectQuery)
                };

                DataSourceConnection {
                    name: ds.name.clone(),
                    kind,
                    workspace_name: if is_cloud { workspace_from_url(&server) } else { None },
                    dataset_name: if is_cloud { Some(database.clone()) } else { None },
                    server,
                    database,
                    provider,
                    is_cloud,
                    connection_string: connection_string.clone(),
                    perspective: parts.perspective,
                    reference_type: ReferenceType::Descriptor,
                    handle: Some(ObjectHandle::data_source(&ds.name)),
                }
            }
            DataSourceDefinition::Structured {
                protocol,
                server,
                database,
            } => {
                let is_cloud = is_cloud_endpoint(server);
                let signature = has_analysis_signature(protocol.as_deref(), "");
                let kind = if signature || is_cloud {
                    ConnectionKind::Live
                } else {
                    Self::kind_from_partitions(&ds.name, tables).unwrap_or(ConnectionKind::Import)
                };

                DataSourceConnection {
                    name: ds.name.clone(),
                    kind,
                    server: server.clone(),
                    database: database.clone(),
                    provider: protocol.clone(),
                    is_cloud,
                    connection_string: format!("Data Source={};Initial Catalog={}", server, database),
                    workspace_name: if is_cloud { workspace_from_url(server) } else { None },
                    dataset_name: if is_cloud { Some(database.clone()) } else { None },
                    perspective: None,
                    reference_type: ReferenceType::StructuredEndpoint,
                    handle: Some(ObjectHandle::data_source(&ds.name)),
                }
            }
        }
    }

    /// Kind implied by the partitions that query a given data source
    fn kind_from_partitions(data_source: &str, tables: &[TableObject]) -> Option<ConnectionKind> {
        let modes: HashSet<StorageMode> = tables
            .iter()
            .flat_map(|t| t.partitions.iter())
            .filter(|p| {
                matches!(&p.source, PartitionSource::Query { data_source: Some(ds), .. } if ds == data_source)
            })
            .map(|p| p.mode)
            .collect();

        if modes.contains(&StorageMode::DirectQuery) {
            Some(ConnectionKind::DirectQuery)
        } else if modes.contains(&StorageMode::Dual) {
            Some(ConnectionKind::Dual)
        } else if modes.contains(&StorageMode::Import) {
            Some(ConnectionKind::Import)
        } else {
            None
        }
    }

    fn scan_bound_expressions(model: &dyn TabularModel, tables: &[TableObject]) -> Vec<DataSourceConnection> {
        let expression_names = model.expression_names();
        let mut referenced = BTreeSet::new();

        for partition in tables
            .iter()
            .flat_map(|t| t.partitions.iter())
            .filter(|p| p.mode == StorageMode::DirectQuery)
        {
            match &partition.source {
                PartitionSource::Entity {
                    expression_source: Some(name),
                    ..
                } => {
                    referenced.insert(name.clone());
                }
                PartitionSource::M { expression } => {
                    for name in &expression_names {
                        if expression.contains(name.as_str()) {
                            referenced.insert(name.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        let mut connections = Vec::new();
        for name in referenced {
            let expression = match model.expression(&name) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping expression '{}': {}", name, e);
                    continue;
                }
            };
            let Some(endpoint) = descriptor::parse_live_expression(&expression.expression) else {
                debug!("Expression '{}' is not a live analytical connection", name);
                continue;
            };
            let is_cloud = is_cloud_endpoint(&endpoint.server);

            connections.push(DataSourceConnection {
                name: name.clone(),
                kind: ConnectionKind::DirectQuery,
                workspace_name: if is_cloud { workspace_from_url(&endpoint.server) } else { None },
                dataset_name: if is_cloud { Some(endpoint.database.clone()) } else { None },
                provider: Some(
                    endpoint
                        .connector
                        .unwrap_or_else(|| "analysis-services".to_string()),
                ),
                server: endpoint.server,
                database: endpoint.database,
                is_cloud,
                connection_string: expression.expression,
                perspective: None,
                reference_type: ReferenceType::ExpressionBound,
                handle: Some(ObjectHandle::expression(name)),
            });
        }
        connections
    }

    fn live_model_connection(model: &dyn TabularModel, tables: &[TableObject]) -> Option<DataSourceConnection> {
        let server = model.server();
        if !is_cloud_endpoint(&server) {
            return None;
        }
        let has_local_storage = tables.iter().flat_map(|t| t.partitions.iter()).any(|p| {
            matches!(
                p.mode,
                StorageMode::Import | StorageMode::DirectQuery | StorageMode::Dual
            )
        });
        if has_local_storage {
            return None;
        }

        let database = model.database();
        debug!("Model '{}' is a pure live connection to {}", model.name(), server);
        Some(DataSourceConnection {
            name: model.name(),
            kind: ConnectionKind::Live,
            workspace_name: workspace_from_url(&server),
            dataset_name: Some(database.clone()),
            connection_string: format!("Data Source={};Initial Catalog={}", server, database),
            server,
            database,
            provider: None,
            is_cloud: true,
            perspective: None,
            reference_type: ReferenceType::LiveModel,
            handle: None,
        })
    }

    /// Distinct per-table storage modes (first non-default partition mode)
    fn table_modes(tables: &[TableObject]) -> HashSet<StorageMode> {
        tables
            .iter()
            .filter_map(|t| {
                t.partitions
                    .iter()
                    .map(|p| p.mode)
                    .find(|m| *m != StorageMode::Default)
            })
            .collect()
    }
}
