//! Report Connection File
//!
//! A live-connected report keeps its connection in `definition.pbir` under
//! `datasetReference.byConnection`. Retargeting it means editing that file
//! while the host application is closed, so swaps here go through the
//! [`ProcessController`]. The original payload is cached for restore.

use crate::connection::descriptor::{is_cloud_endpoint, quote_if_needed};
use crate::connection::{CloudConnectionType, SwapTarget};
use crate::process::{ProcessController, WorkflowOptions, WorkflowResult};
use crate::store::file::write_bytes_atomic_blocking;
use crate::store::{
    CacheStore, EndpointLabel, HistoryOperation, HistoryStore, StoreError, SwapHistoryEntry,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use crate::store::CloudConnectionPayload as ReportConnection;

const CONNECTION_POINTER: &str = "/datasetReference/byConnection";

/// Connection types written to the file
pub const LOCAL_CONNECTION_TYPE: &str = "analysisServicesDatabaseLive";
pub const HOSTED_CONNECTION_TYPE: &str = "pbiServiceXmlaStyleLive";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} has no datasetReference.byConnection block")]
    MissingConnection(String),

    #[error("No cached original connection for {0}")]
    NotCached(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn parse_connection(path: &Path, document: &Value) -> Result<ReportConnection, ReportError> {
    let block = document
        .pointer(CONNECTION_POINTER)
        .filter(|v| v.is_object())
        .ok_or_else(|| ReportError::MissingConnection(path.display().to_string()))?;
    Ok(serde_json::from_value(block.clone())?)
}

/// Read the connection block of a report definition
pub async fn read_report_connection(path: &Path) -> Result<ReportConnection, ReportError> {
    let raw = tokio::fs::read(path).await?;
    let document: Value = serde_json::from_slice(&raw)?;
    parse_connection(path, &document)
}

/// Replace the connection block atomically; everything else in the file is kept
pub fn write_report_connection(path: &Path, connection: &ReportConnection) -> Result<(), ReportError> {
    let raw = std::fs::read(path)?;
    let mut document: Value = serde_json::from_slice(&raw)?;
    let block = document
        .pointer_mut(CONNECTION_POINTER)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ReportError::MissingConnection(path.display().to_string()))?;

    let Value::Object(fields) = serde_json::to_value(connection)? else {
        return Err(ReportError::MissingConnection(path.display().to_string()));
    };
    merge_connection(block, fields);

    write_bytes_atomic_blocking(path, &serde_json::to_vec_pretty(&document)?)?;
    Ok(())
}

/// Known keys absent from `fields` are nulled; unknown keys are left alone
fn merge_connection(block: &mut Map<String, Value>, fields: Map<String, Value>) {
    for key in [
        "connectionString",
        "connectionType",
        "pbiServiceModelId",
        "pbiModelVirtualServerName",
        "pbiModelDatabaseName",
    ] {
        if block.contains_key(key) && !fields.contains_key(key) {
            block.insert(key.to_string(), Value::Null);
        }
    }
    block.extend(fields);
}

impl ReportConnection {
    pub fn is_hosted(&self) -> bool {
        is_cloud_endpoint(&self.connection_string)
    }

    /// Payload pointing at `target`, keeping the data source name
    pub fn retarget(&self, target: &SwapTarget) -> Self {
        if !target.is_cloud() {
            return Self {
                connection_string: format!(
                    "Data Source={};Initial Catalog={}",
                    quote_if_needed(&target.server),
                    quote_if_needed(&target.database)
                ),
                connection_type: Some(LOCAL_CONNECTION_TYPE.to_string()),
                pbi_service_model_id: None,
                pbi_model_virtual_server_name: None,
                pbi_model_database_name: None,
                name: self.name.clone(),
            };
        }

        let dataset = target.dataset_name.as_deref().unwrap_or(&target.database);
        let mut connection_string = format!(
            "Data Source=\"{}\";Initial Catalog={};Integrated Security=ClaimsToken",
            target.server,
            quote_if_needed(dataset)
        );
        if target.cloud_connection_type == Some(CloudConnectionType::SemanticModel) {
            if let Some(id) = &target.dataset_id {
                connection_string.push_str(&format!(";SemanticModelId={}", id));
            }
        }
        Self {
            connection_string,
            connection_type: Some(HOSTED_CONNECTION_TYPE.to_string()),
            pbi_service_model_id: None,
            pbi_model_virtual_server_name: None,
            pbi_model_database_name: target.dataset_id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Result of a report swap or restore
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSwapOutcome {
    pub workflow: WorkflowResult,
    pub previous: ReportConnection,
    pub current: ReportConnection,
    /// Hosted dataset identity differs from the cached original
    pub identity_changed: Option<bool>,
}

/// Host-process-aware swap of a report's connection
pub struct ReportSwapWorkflow<'a> {
    cache: &'a CacheStore,
    history: &'a HistoryStore,
    controller: &'a ProcessController,
}

impl<'a> ReportSwapWorkflow<'a> {
    pub fn new(cache: &'a CacheStore, history: &'a HistoryStore, controller: &'a ProcessController) -> Self {
        Self {
            cache,
            history,
            controller,
        }
    }

    pub async fn swap(
        &self,
        path: &Path,
        target: &SwapTarget,
        pid: Option<u32>,
        options: WorkflowOptions,
    ) -> Result<ReportSwapOutcome, ReportError> {
        let current = read_report_connection(path).await?;

        // Only a republish of the cached original replaces it. A file already
        // pointing elsewhere is one of our own earlier swaps.
        let identity_changed = if current.is_hosted() {
            self.cache.has_identity_changed(path, &current).await
        } else {
            None
        };
        if identity_changed == Some(true) {
            warn!(
                "Hosted dataset behind {} was republished; caching its new identity",
                path.display()
            );
            self.cache.remember(path, current.clone()).await?;
        } else if self.cache.get(path).await.is_none() {
            self.cache.remember(path, current.clone()).await?;
        }

        let retargeted = current.retarget(target);
        let workflow = self.patch(path, retargeted.clone(), pid, options).await;
        if workflow.success {
            self.journal(HistoryOperation::ReportPatch, path, &current, &retargeted)
                .await;
        }

        Ok(ReportSwapOutcome {
            workflow,
            previous: current,
            current: retargeted,
            identity_changed,
        })
    }

    /// Re-apply the cached original payload
    pub async fn restore(
        &self,
        path: &Path,
        pid: Option<u32>,
        options: WorkflowOptions,
    ) -> Result<ReportSwapOutcome, ReportError> {
        let cached = self
            .cache
            .get(path)
            .await
            .ok_or_else(|| ReportError::NotCached(path.display().to_string()))?;
        let current = read_report_connection(path).await?;

        let original = cached.payload;
        let workflow = self.patch(path, original.clone(), pid, options).await;
        if workflow.success {
            self.journal(HistoryOperation::ReportRestore, path, &current, &original)
                .await;
            self.cache.forget(path).await?;
        }

        Ok(ReportSwapOutcome {
            workflow,
            previous: current,
            current: original,
            identity_changed: None,
        })
    }

    async fn patch(
        &self,
        path: &Path,
        payload: ReportConnection,
        pid: Option<u32>,
        options: WorkflowOptions,
    ) -> WorkflowResult {
        self.controller
            .run_workflow(pid, path, options, move |file| {
                write_report_connection(file, &payload)?;
                Ok(())
            })
            .await
    }

    async fn journal(
        &self,
        operation: HistoryOperation,
        path: &Path,
        before: &ReportConnection,
        after: &ReportConnection,
    ) {
        let (original_server, original_database) = before.endpoint();
        let (new_server, new_database) = after.endpoint();
        let entry = SwapHistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            connection_name: after.name.clone().unwrap_or_else(|| "report".to_string()),
            source_kind: EndpointLabel::classify(&original_server, None),
            target_kind: EndpointLabel::classify(&new_server, None),
            original_server,
            original_database,
            original_connection_string: before.connection_string.clone(),
            new_server,
            new_database,
            new_connection_string: after.connection_string.clone(),
            batch_id: Uuid::new_v4(),
            file_path: Some(crate::store::file::normalize_path(path)),
        };
        info!(
            operation = ?operation,
            file = %path.display(),
            to = %entry.new_server,
            "Report connection rewritten"
        );
        if let Err(e) = self.history.append(entry).await {
            warn!("Failed to journal report change of {}: {}", path.display(), e);
        }
    }
}

/// `definition.pbir` for a report folder or file path
pub fn definition_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join("definition.pbir")
    } else {
        path.to_path_buf()
    }
}
