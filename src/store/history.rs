//! Swap History Journal
//!
//! Append-only record of every applied swap, rollback and report patch.
//! Entries swapped together share a batch id. Only the newest
//! [`MAX_HISTORY_ENTRIES`] are kept.

use super::file::{load_document, save_document};
use super::StoreError;
use crate::connection::{CloudConnectionType, ConnectionMapping, OriginalConnection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const MAX_HISTORY_ENTRIES: usize = 1000;

/// Human-readable endpoint family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointLabel {
    Local,
    Cloud,
    #[serde(rename = "XMLA")]
    Xmla,
}

impl EndpointLabel {
    /// Classify from the server string and, when known, the cloud subtype
    pub fn classify(server: &str, cloud_type: Option<CloudConnectionType>) -> Self {
        let lower = server.trim().to_ascii_lowercase();
        let is_local = lower.starts_with("localhost")
            || lower.starts_with("127.0.0.1")
            || lower.starts_with("[::1]")
            || lower.starts_with(".:")
            || lower == ".";
        if is_local {
            return EndpointLabel::Local;
        }
        match cloud_type {
            Some(CloudConnectionType::SemanticModel) => EndpointLabel::Cloud,
            Some(CloudConnectionType::Xmla) => EndpointLabel::Xmla,
            None if lower.starts_with("powerbi://") || lower.starts_with("asazure://") => EndpointLabel::Xmla,
            None if crate::connection::descriptor::is_cloud_endpoint(&lower) => EndpointLabel::Cloud,
            None => EndpointLabel::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    Swap,
    Rollback,
    ReportPatch,
    ReportRestore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapHistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: HistoryOperation,
    pub connection_name: String,
    pub original_server: String,
    pub original_database: String,
    pub original_connection_string: String,
    pub new_server: String,
    pub new_database: String,
    pub new_connection_string: String,
    pub batch_id: Uuid,
    pub file_path: Option<String>,
    pub source_kind: EndpointLabel,
    pub target_kind: EndpointLabel,
}

impl SwapHistoryEntry {
    /// Entry for a mapping whose source has just been re-pointed from `before`
    pub fn for_mapping(
        operation: HistoryOperation,
        mapping: &ConnectionMapping,
        before: &OriginalConnection,
        before_cloud: Option<CloudConnectionType>,
        batch_id: Uuid,
        file_path: Option<String>,
    ) -> Self {
        let after_cloud = mapping
            .source
            .is_cloud
            .then(|| crate::connection::descriptor::cloud_type_of(&mapping.source.server));
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            connection_name: mapping.source.name.clone(),
            source_kind: EndpointLabel::classify(&before.server, before_cloud),
            target_kind: EndpointLabel::classify(&mapping.source.server, after_cloud),
            original_server: before.server.clone(),
            original_database: before.database.clone(),
            original_connection_string: before.connection_string.clone(),
            new_server: mapping.source.server.clone(),
            new_database: mapping.source.database.clone(),
            new_connection_string: mapping.source.connection_string.clone(),
            batch_id,
            file_path,
        }
    }
}

pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
    entries: RwLock<Vec<SwapHistoryEntry>>,
}

impl HistoryStore {
    pub async fn load(path: PathBuf) -> Self {
        Self::load_capped(path, MAX_HISTORY_ENTRIES).await
    }

    pub async fn load_capped(path: PathBuf, max_entries: usize) -> Self {
        let mut entries: Vec<SwapHistoryEntry> = load_document(&path).await;
        let excess = entries.len().saturating_sub(max_entries);
        entries.drain(..excess);
        Self {
            path,
            max_entries,
            entries: RwLock::new(entries),
        }
    }

    /// Persist first; memory only changes once the file is written
    pub async fn append(&self, entry: SwapHistoryEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        debug!(
            "Journal {:?} of '{}': {} -> {}",
            entry.operation, entry.connection_name, entry.original_server, entry.new_server
        );
        let mut updated = entries.clone();
        updated.push(entry);
        let excess = updated.len().saturating_sub(self.max_entries);
        updated.drain(..excess);

        save_document(&self.path, &updated).await?;
        *entries = updated;
        Ok(())
    }

    /// Newest first, optionally restricted to one file
    pub async fn list(&self, file_path: Option<&str>, limit: usize) -> Vec<SwapHistoryEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| file_path.map_or(true, |p| e.file_path.as_deref() == Some(p)))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn batch(&self, batch_id: Uuid) -> Vec<SwapHistoryEntry> {
        let entries = self.entries.read().await;
        entries.iter().filter(|e| e.batch_id == batch_id).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
