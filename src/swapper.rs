//! Connection Swapper
//!
//! Re-points one connection of a live model at a new endpoint and commits
//! the change. A successful swap flips the mapping so that swapping it again
//! reverts to the previous endpoint. Failures never panic: every outcome is
//! reported through a [`SwapResult`].

use crate::connection::descriptor::{
    build_connection_string, cloud_type_of, is_cloud_endpoint, parse_connection_string,
    replace_expression_endpoint, workspace_from_url,
};
use crate::connection::{
    ConnectionMapping, DataSourceConnection, HandleCollection, MappingStatus, ObjectHandle,
    OriginalConnection, ReferenceType, SwapResult, SwapTarget,
};
use crate::store::{HistoryOperation, HistoryStore, SwapHistoryEntry};
use crate::tabular::{run_blocking, DataSourceDefinition, ModelError, RefreshType, TabularModel};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Grouping for the history entries of one request
#[derive(Debug, Clone)]
pub struct SwapContext {
    pub batch_id: Uuid,
    pub file_path: Option<String>,
}

impl SwapContext {
    pub fn new(file_path: Option<String>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            file_path,
        }
    }
}

#[derive(Error, Debug)]
enum SwapError {
    #[error("Reference '{name}' could not be resolved: {source}")]
    Stale { name: String, source: ModelError },

    #[error("Reference '{0}' does not match its connection kind")]
    KindMismatch(String),

    #[error("Expression '{0}' holds no recognizable live endpoint")]
    NoEndpoint(String),

    #[error("Expression '{0}' already points at the requested endpoint")]
    Unchanged(String),

    #[error("Failed to update '{name}': {source}")]
    Mutation { name: String, source: ModelError },

    #[error("Commit failed, local changes discarded: {0}")]
    Commit(ModelError),
}

/// Endpoint values to write, in every form a reference may need
struct Endpoint<'a> {
    server: &'a str,
    database: &'a str,
    descriptor: &'a str,
}

/// An object of the model, re-resolved by name
enum Resolved {
    Descriptor { connection_string: String },
    Structured { server: String, database: String },
    Expression { body: String },
}

/// Display descriptor of a structured address
fn address_descriptor(server: &str, database: &str) -> String {
    format!("Data Source={};Initial Catalog={}", server, database)
}

pub struct ConnectionSwapper {
    history: Option<Arc<HistoryStore>>,
}

impl ConnectionSwapper {
    pub fn new(history: Option<Arc<HistoryStore>>) -> Self {
        Self { history }
    }

    /// Swap `mapping.source` to `mapping.target` and commit
    pub async fn swap(
        &self,
        model: &mut dyn TabularModel,
        mapping: &mut ConnectionMapping,
        ctx: &SwapContext,
    ) -> SwapResult {
        let started = Instant::now();

        let target = match Self::precheck(mapping) {
            Ok(target) => target,
            Err(reason) => return Self::rejected(mapping, reason, started),
        };

        mapping.capture_original();
        mapping.status = MappingStatus::Swapping;
        let previous = mapping.source.clone();

        let provider = parse_connection_string(&previous.connection_string)
            .provider
            .or_else(|| previous.provider.clone());
        let descriptor = build_connection_string(&target, provider.as_deref());
        let endpoint = Endpoint {
            server: &target.server,
            database: &target.database,
            descriptor: &descriptor,
        };

        let written = match run_blocking(|| Self::apply(model, &previous, &endpoint)) {
            Ok(written) => written,
            Err(e) => return Self::failed(mapping, e, started),
        };

        Self::repoint(
            &mut mapping.source,
            &target.server,
            &target.database,
            written,
            target.is_cloud(),
        );
        mapping.source.perspective = target.perspective.clone();
        if let Some(dataset) = &target.dataset_name {
            mapping.source.dataset_name = Some(dataset.clone());
        }
        mapping.target = Some(SwapTarget::from_connection(&previous));
        mapping.auto_matched = false;
        mapping.error_message = None;
        mapping.status = MappingStatus::Success;

        self.journal(HistoryOperation::Swap, mapping, &previous, ctx).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            connection = %previous.name,
            from = %previous.server,
            to = %mapping.source.server,
            elapsed_ms,
            "Connection swapped"
        );

        mapping.status = MappingStatus::Ready;
        SwapResult {
            success: true,
            message: format!(
                "Swapped '{}' to {} / {}",
                previous.name, mapping.source.server, mapping.source.database
            ),
            mapping: mapping.clone(),
            elapsed_ms,
        }
    }

    /// Re-apply the values captured before the first swap
    pub async fn rollback(
        &self,
        model: &mut dyn TabularModel,
        mapping: &mut ConnectionMapping,
        ctx: &SwapContext,
    ) -> SwapResult {
        let started = Instant::now();

        let Some(original) = mapping.original.clone() else {
            return Self::rejected(mapping, "No original connection was captured".to_string(), started);
        };
        if let Err(reason) = Self::check_reference(&mapping.source) {
            return Self::rejected(mapping, reason, started);
        }
        if OriginalConnection::of(&mapping.source) == original {
            mapping.status = MappingStatus::Ready;
            return SwapResult {
                success: true,
                message: format!("'{}' already uses its original connection", mapping.source.name),
                mapping: mapping.clone(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
        }

        mapping.status = MappingStatus::Swapping;
        let previous = mapping.source.clone();
        let endpoint = Endpoint {
            server: &original.server,
            database: &original.database,
            descriptor: &original.connection_string,
        };

        let written = match run_blocking(|| Self::apply(model, &previous, &endpoint)) {
            Ok(written) => written,
            Err(e) => return Self::failed(mapping, e, started),
        };

        let cloud = is_cloud_endpoint(&original.server);
        Self::repoint(&mut mapping.source, &original.server, &original.database, written, cloud);
        mapping.source.perspective = parse_connection_string(&original.connection_string).perspective;
        mapping.target = Some(SwapTarget::from_connection(&previous));
        mapping.auto_matched = false;
        mapping.error_message = None;

        self.journal(HistoryOperation::Rollback, mapping, &previous, ctx).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            connection = %previous.name,
            restored = %original.server,
            elapsed_ms,
            "Connection rolled back"
        );

        mapping.status = MappingStatus::Ready;
        SwapResult {
            success: true,
            message: format!("Restored '{}' to {} / {}", previous.name, original.server, original.database),
            mapping: mapping.clone(),
            elapsed_ms,
        }
    }

    fn check_reference(source: &DataSourceConnection) -> Result<(), String> {
        if source.reference_type == ReferenceType::LiveModel {
            return Err(format!(
                "'{}' is a pure live-connection model; edit the report file instead",
                source.name
            ));
        }
        if source.handle.is_none() {
            return Err(format!("'{}' has no model reference", source.name));
        }
        Ok(())
    }

    fn precheck(mapping: &ConnectionMapping) -> Result<SwapTarget, String> {
        let Some(target) = mapping.target.clone() else {
            return Err(format!("'{}' has no target", mapping.source.name));
        };
        Self::check_reference(&mapping.source)?;
        if target.server == mapping.source.server && target.database == mapping.source.database {
            return Err(format!(
                "'{}' already points at {} / {}",
                mapping.source.name, target.server, target.database
            ));
        }
        Ok(target)
    }

    fn resolve(model: &dyn TabularModel, handle: &ObjectHandle) -> Result<Resolved, ModelError> {
        match handle.collection {
            HandleCollection::DataSource => {
                let ds = model.data_source(&handle.name)?;
                Ok(match ds.definition {
                    DataSourceDefinition::Provider {
                        connection_string, ..
                    } => Resolved::Descriptor { connection_string },
                    DataSourceDefinition::Structured { server, database, .. } => {
                        Resolved::Structured { server, database }
                    }
                })
            }
            HandleCollection::Expression => Ok(Resolved::Expression {
                body: model.expression(&handle.name)?.expression,
            }),
        }
    }

    /// Current stored value of a reference, in the form `apply` returns
    fn read_back(model: &dyn TabularModel, handle: &ObjectHandle) -> Result<String, ModelError> {
        Ok(match Self::resolve(model, handle)? {
            Resolved::Descriptor { connection_string } => connection_string,
            Resolved::Structured { server, database } => address_descriptor(&server, &database),
            Resolved::Expression { body } => body,
        })
    }

    /// Mutate, commit and verify. Returns the value now stored.
    fn apply(
        model: &mut dyn TabularModel,
        source: &DataSourceConnection,
        endpoint: &Endpoint<'_>,
    ) -> Result<String, SwapError> {
        let handle = source
            .handle
            .as_ref()
            .ok_or_else(|| SwapError::KindMismatch(source.name.clone()))?;

        let resolved = Self::resolve(model, handle).map_err(|e| SwapError::Stale {
            name: handle.name.clone(),
            source: e,
        })?;

        let mutation = |e| SwapError::Mutation {
            name: handle.name.clone(),
            source: e,
        };
        let written = match (source.reference_type, resolved) {
            (ReferenceType::Descriptor, Resolved::Descriptor { .. }) => {
                model
                    .set_connection_string(&handle.name, endpoint.descriptor)
                    .map_err(mutation)?;
                endpoint.descriptor.to_string()
            }
            (ReferenceType::StructuredEndpoint, Resolved::Structured { .. }) => {
                model
                    .set_structured_address(&handle.name, endpoint.server, endpoint.database)
                    .map_err(mutation)?;
                address_descriptor(endpoint.server, endpoint.database)
            }
            (ReferenceType::ExpressionBound, Resolved::Expression { body }) => {
                let updated = replace_expression_endpoint(&body, endpoint.server, endpoint.database)
                    .ok_or_else(|| SwapError::NoEndpoint(handle.name.clone()))?;
                if updated == body {
                    return Err(SwapError::Unchanged(handle.name.clone()));
                }
                model.set_expression(&handle.name, &updated).map_err(mutation)?;
                updated
            }
            _ => return Err(SwapError::KindMismatch(handle.name.clone())),
        };

        if let Err(e) = model.save_changes() {
            error!(
                connection = %source.name,
                model = %model.name(),
                error = %e,
                "Commit failed; discarding local changes"
            );
            model.undo_local_changes();
            return Err(SwapError::Commit(e));
        }

        if let Err(e) = model.request_refresh(RefreshType::Calculate) {
            warn!("Metadata refresh after swapping '{}' failed: {}", source.name, e);
        }

        match Self::read_back(model, handle) {
            Ok(stored) if stored == written => debug!("Verified new value of '{}'", handle.name),
            Ok(stored) => warn!(
                "Read-back of '{}' differs from the written value: {:?} != {:?}",
                handle.name, stored, written
            ),
            Err(e) => warn!("Could not read back '{}': {}", handle.name, e),
        }

        Ok(written)
    }

    fn repoint(source: &mut DataSourceConnection, server: &str, database: &str, written: String, cloud: bool) {
        let is_cloud = cloud || is_cloud_endpoint(server);
        source.server = server.to_string();
        source.database = database.to_string();
        source.connection_string = written;
        source.is_cloud = is_cloud;
        source.workspace_name = if is_cloud { workspace_from_url(server) } else { None };
        source.dataset_name = if is_cloud { Some(database.to_string()) } else { None };
    }

    async fn journal(
        &self,
        operation: HistoryOperation,
        mapping: &ConnectionMapping,
        previous: &DataSourceConnection,
        ctx: &SwapContext,
    ) {
        let Some(history) = &self.history else {
            return;
        };
        let before = OriginalConnection::of(previous);
        let before_cloud = previous.is_cloud.then(|| cloud_type_of(&previous.server));
        let entry = SwapHistoryEntry::for_mapping(
            operation,
            mapping,
            &before,
            before_cloud,
            ctx.batch_id,
            ctx.file_path.clone(),
        );
        if let Err(e) = history.append(entry).await {
            warn!("Failed to journal {:?} of '{}': {}", operation, previous.name, e);
        }
    }

    /// Configuration problem: nothing was touched
    fn rejected(mapping: &ConnectionMapping, reason: String, started: Instant) -> SwapResult {
        warn!("Swap rejected: {}", reason);
        SwapResult {
            success: false,
            mapping: mapping.clone(),
            message: reason,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failed(mapping: &mut ConnectionMapping, error: SwapError, started: Instant) -> SwapResult {
        let message = error.to_string();
        error!(connection = %mapping.source.name, "Swap failed: {}", message);
        mapping.status = MappingStatus::Error;
        mapping.error_message = Some(message.clone());
        SwapResult {
            success: false,
            mapping: mapping.clone(),
            message,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ModelConnectionInfo;
    use crate::detector::ConnectionDetector;
    use crate::tabular::bim::tests::sample_document;
    use crate::tabular::{BimModel, DataSourceObject, ExpressionObject, TableObject};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CLOUD_SERVER: &str = "powerbi://api.powerbi.com/v1.0/myorg/Sales";

    fn warehouse_mapping(model: &BimModel) -> ConnectionMapping {
        let info: ModelConnectionInfo = ConnectionDetector::detect(model);
        let source = info.find("Warehouse").unwrap().clone();
        ConnectionMapping::new(source).with_target(SwapTarget::cloud(CLOUD_SERVER, "SalesModel"), false)
    }

    fn stored_connection_string(model: &dyn TabularModel) -> String {
        match model.data_source("Warehouse").unwrap().definition {
            DataSourceDefinition::Provider { connection_string, .. } => connection_string,
            other => panic!("unexpected definition {:?}", other),
        }
    }

    /// Delegates to a document model but refuses every commit
    struct RejectingCommit(BimModel);

    impl TabularModel for RejectingCommit {
        fn name(&self) -> String {
            self.0.name()
        }
        fn server(&self) -> String {
            self.0.server()
        }
        fn database(&self) -> String {
            self.0.database()
        }
        fn data_source_names(&self) -> Vec<String> {
            self.0.data_source_names()
        }
        fn data_source(&self, name: &str) -> Result<DataSourceObject, ModelError> {
            self.0.data_source(name)
        }
        fn tables(&self) -> Result<Vec<TableObject>, ModelError> {
            self.0.tables()
        }
        fn expression_names(&self) -> Vec<String> {
            self.0.expression_names()
        }
        fn expression(&self, name: &str) -> Result<ExpressionObject, ModelError> {
            self.0.expression(name)
        }
        fn relationship_count(&self) -> Result<usize, ModelError> {
            self.0.relationship_count()
        }
        fn set_connection_string(&mut self, data_source: &str, value: &str) -> Result<(), ModelError> {
            self.0.set_connection_string(data_source, value)
        }
        fn set_structured_address(&mut self, ds: &str, server: &str, database: &str) -> Result<(), ModelError> {
            self.0.set_structured_address(ds, server, database)
        }
        fn set_expression(&mut self, name: &str, expression: &str) -> Result<(), ModelError> {
            self.0.set_expression(name, expression)
        }
        fn save_changes(&mut self) -> Result<(), ModelError> {
            Err(ModelError::Commit("server went away".to_string()))
        }
        fn undo_local_changes(&mut self) {
            self.0.undo_local_changes()
        }
        fn request_refresh(&mut self, refresh: RefreshType) -> Result<(), ModelError> {
            self.0.request_refresh(refresh)
        }
    }

    #[tokio::test]
    async fn test_swap_local_to_cloud_flips_mapping() {
        let mut model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        let mut mapping = warehouse_mapping(&model);
        let swapper = ConnectionSwapper::new(None);

        let result = swapper.swap(&mut model, &mut mapping, &SwapContext::new(None)).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(mapping.status, MappingStatus::Ready);
        assert_eq!(mapping.source.server, CLOUD_SERVER);
        assert_eq!(mapping.source.database, "SalesModel");
        assert!(mapping.source.is_cloud);
        assert_eq!(mapping.source.workspace_name.as_deref(), Some("Sales"));

        let target = mapping.target.as_ref().unwrap();
        assert_eq!(target.server, "localhost:52700");
        assert_eq!(target.database, "AAAA-BBBB");

        assert_eq!(
            stored_connection_string(&model),
            format!("Provider=MSOLAP.8;Data Source={};Initial Catalog=SalesModel", CLOUD_SERVER)
        );
    }

    #[tokio::test]
    async fn test_second_swap_restores_original_exactly() {
        let mut model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        let mut mapping = warehouse_mapping(&model);
        let original = mapping.original.clone().unwrap();
        let swapper = ConnectionSwapper::new(None);

        assert!(swapper.swap(&mut model, &mut mapping, &SwapContext::new(None)).await.success);
        assert!(swapper.swap(&mut model, &mut mapping, &SwapContext::new(None)).await.success);

        assert_eq!(mapping.source.server, original.server);
        assert_eq!(mapping.source.database, original.database);
        assert_eq!(stored_connection_string(&model), original.connection_string);
        assert!(!mapping.source.is_cloud);
    }

    #[tokio::test]
    async fn test_rollback_resets_to_ready_and_journals() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::load(dir.path().join("history.json")).await);
        let swapper = ConnectionSwapper::new(Some(history.clone()));
        let ctx = SwapContext::new(Some("sales.bim".to_string()));

        let mut model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        let mut mapping = warehouse_mapping(&model);
        let original = mapping.original.clone().unwrap();

        assert!(swapper.swap(&mut model, &mut mapping, &ctx).await.success);
        let result = swapper.rollback(&mut model, &mut mapping, &ctx).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(mapping.status, MappingStatus::Ready);
        assert_eq!(stored_connection_string(&model), original.connection_string);
        assert_eq!(mapping.target.as_ref().unwrap().server, CLOUD_SERVER);

        let entries = history.batch(ctx.batch_id).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, HistoryOperation::Swap);
        assert_eq!(entries[1].operation, HistoryOperation::Rollback);
        assert_eq!(entries[1].new_server, "localhost:52700");
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_source_untouched() {
        let mut model = RejectingCommit(BimModel::from_value(sample_document(), "localhost:52700").unwrap());
        let mut mapping = warehouse_mapping(&model.0);
        let before = mapping.source.clone();

        let result = ConnectionSwapper::new(None)
            .swap(&mut model, &mut mapping, &SwapContext::new(None))
            .await;

        assert!(!result.success);
        assert_eq!(mapping.status, MappingStatus::Error);
        assert!(mapping.error_message.as_deref().unwrap().contains("server went away"));
        assert_eq!(mapping.source.server, before.server);
        assert_eq!(mapping.target.as_ref().unwrap().server, CLOUD_SERVER);
        assert_eq!(stored_connection_string(&model), before.connection_string);
    }

    #[tokio::test]
    async fn test_stale_handle_fails() {
        let mut model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        let mut mapping = warehouse_mapping(&model);
        mapping.source.handle = Some(ObjectHandle::data_source("Gone"));

        let result = ConnectionSwapper::new(None)
            .swap(&mut model, &mut mapping, &SwapContext::new(None))
            .await;

        assert!(!result.success);
        assert_eq!(mapping.status, MappingStatus::Error);
        assert!(result.message.contains("Gone"));
    }

    #[tokio::test]
    async fn test_rejections_leave_state_unchanged() {
        let mut model = BimModel::from_value(sample_document(), "localhost:52700").unwrap();
        let swapper = ConnectionSwapper::new(None);

        let mut live = warehouse_mapping(&model);
        live.source.reference_type = ReferenceType::LiveModel;
        let result = swapper.swap(&mut model, &mut live, &SwapContext::new(None)).await;
        assert!(!result.success);
        assert_eq!(live.status, MappingStatus::Ready);

        let mut untargeted = warehouse_mapping(&model);
        untargeted.target = None;
        untargeted.status = MappingStatus::Pending;
        let result = swapper.swap(&mut model, &mut untargeted, &SwapContext::new(None)).await;
        assert!(!result.success);
        assert_eq!(untargeted.status, MappingStatus::Pending);
        assert_eq!(untargeted.error_message, None);
    }

    #[tokio::test]
    async fn test_expression_bound_swap_preserves_options() {
        let mut doc = sample_document();
        doc["model"]["dataSources"] = json!([]);
        doc["model"]["expressions"] = json!([{
            "name": "DirectQuery to AS - Sales",
            "kind": "m",
            "expression": [
                "let",
                "    Source = AnalysisServices.Database(\"localhost:52700\", \"AAAA-BBBB\", [Implementation=\"2.0\"])",
                "in",
                "    Source"
            ]
        }]);
        doc["model"]["tables"][0]["partitions"] = json!([{
            "name": "Orders",
            "mode": "directQuery",
            "source": { "type": "entity", "expressionSource": "DirectQuery to AS - Sales", "entityName": "Orders" }
        }]);
        let mut model = BimModel::from_value(doc, "localhost:52700").unwrap();
        let info = ConnectionDetector::detect(&model);
        let source = info.connections[0].clone();
        assert_eq!(source.reference_type, ReferenceType::ExpressionBound);

        let mut mapping = ConnectionMapping::new(source)
            .with_target(SwapTarget::cloud(CLOUD_SERVER, "SalesModel"), false);
        let result = ConnectionSwapper::new(None)
            .swap(&mut model, &mut mapping, &SwapContext::new(None))
            .await;

        assert!(result.success, "{}", result.message);
        let body = model.expression("DirectQuery to AS - Sales").unwrap().expression;
        assert!(body.contains(&format!("AnalysisServices.Database(\"{}\", \"SalesModel\"", CLOUD_SERVER)));
        assert!(body.contains("[Implementation=\"2.0\"]"));
        assert_eq!(mapping.source.connection_string, body);
    }

    #[tokio::test]
    async fn test_structured_endpoint_swap_and_rollback() {
        let mut doc = sample_document();
        doc["model"]["dataSources"] = json!([{
            "type": "structured",
            "name": "Hosted",
            "connectionDetails": {
                "protocol": "tds",
                "address": { "server": CLOUD_SERVER, "database": "SalesModel" }
            }
        }]);
        doc["model"]["tables"][0]["partitions"][0]["source"]["dataSource"] = json!("Hosted");
        let mut model = BimModel::from_value(doc, "localhost:52700").unwrap();
        let source = ConnectionDetector::detect(&model).find("Hosted").unwrap().clone();
        assert_eq!(source.reference_type, ReferenceType::StructuredEndpoint);

        let address = |model: &BimModel| match model.data_source("Hosted").unwrap().definition {
            DataSourceDefinition::Structured { server, database, .. } => (server, database),
            other => panic!("unexpected definition {:?}", other),
        };

        let mut mapping = ConnectionMapping::new(source)
            .with_target(SwapTarget::local("localhost:52700", "AAAA-BBBB"), false);
        let swapper = ConnectionSwapper::new(None);
        let ctx = SwapContext::new(None);

        let result = swapper.swap(&mut model, &mut mapping, &ctx).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(address(&model), ("localhost:52700".to_string(), "AAAA-BBBB".to_string()));
        assert_eq!(mapping.source.server, "localhost:52700");
        assert!(!mapping.source.is_cloud);

        let result = swapper.rollback(&mut model, &mut mapping, &ctx).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(mapping.status, MappingStatus::Ready);
        assert_eq!(address(&model), (CLOUD_SERVER.to_string(), "SalesModel".to_string()));
        assert_eq!(mapping.source.server, CLOUD_SERVER);
        let document = model.document();
        assert_eq!(document["model"]["dataSources"][0]["connectionDetails"]["protocol"], "tds");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_backed_swap_commits_off_the_async_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bim");
        std::fs::write(&path, serde_json::to_vec_pretty(&sample_document()).unwrap()).unwrap();

        let mut model = BimModel::open(&path, "localhost:52700").unwrap();
        let mut mapping = warehouse_mapping(&model);
        let result = ConnectionSwapper::new(None)
            .swap(&mut model, &mut mapping, &SwapContext::new(None))
            .await;
        assert!(result.success, "{}", result.message);

        let reopened = BimModel::open(&path, "localhost:52700").unwrap();
        assert_eq!(
            stored_connection_string(&reopened),
            format!("Provider=MSOLAP.8;Data Source={};Initial Catalog=SalesModel", CLOUD_SERVER)
        );
    }
}
