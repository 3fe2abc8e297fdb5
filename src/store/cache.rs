//! Connection Cache
//!
//! Remembers the original cloud connection payload of a file, keyed by its
//! normalized path, together with a schema fingerprint. A changed
//! fingerprint at the same server and catalog means the hosted dataset was
//! re-published under a new identity.

use super::file::{load_document, normalize_path, save_document};
use super::StoreError;
use crate::connection::descriptor::parse_connection_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

/// Connection block of a live-connected report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConnectionPayload {
    pub connection_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbi_service_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbi_model_virtual_server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbi_model_database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CloudConnectionPayload {
    /// Server and catalog named by the connection string
    pub fn endpoint(&self) -> (String, String) {
        let parts = parse_connection_string(&self.connection_string);
        (
            parts.server.unwrap_or_default(),
            parts.database.unwrap_or_default(),
        )
    }

    pub fn same_endpoint(&self, other: &Self) -> bool {
        let (server, database) = self.endpoint();
        let (other_server, other_database) = other.endpoint();
        server.eq_ignore_ascii_case(&other_server) && database.eq_ignore_ascii_case(&other_database)
    }

    /// Hash over the identity fields only
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.connection_type.as_deref(),
            self.pbi_service_model_id.as_deref(),
            self.pbi_model_virtual_server_name.as_deref(),
            self.pbi_model_database_name.as_deref(),
        ] {
            hasher.update(field.unwrap_or("").as_bytes());
            hasher.update(b"|");
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub file_path: String,
    pub payload: CloudConnectionPayload,
    pub fingerprint: String,
    pub cached_at: DateTime<Utc>,
}

pub struct CacheStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub async fn load(path: PathBuf) -> Self {
        let entries: HashMap<String, CacheEntry> = load_document(&path).await;
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    async fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), StoreError> {
        save_document(&self.path, entries).await
    }

    /// Cache `payload` for `file`, replacing any previous entry
    pub async fn remember(&self, file: &Path, payload: CloudConnectionPayload) -> Result<CacheEntry, StoreError> {
        let key = normalize_path(file);
        let entry = CacheEntry {
            file_path: key.clone(),
            fingerprint: payload.fingerprint(),
            payload,
            cached_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        updated.insert(key.clone(), entry.clone());
        self.persist(&updated).await?;
        *entries = updated;

        info!("Cached connection payload for {}", key);
        Ok(entry)
    }

    pub async fn get(&self, file: &Path) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries.get(&normalize_path(file)).cloned()
    }

    pub async fn forget(&self, file: &Path) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        let removed = updated.remove(&normalize_path(file)).is_some();
        if removed {
            self.persist(&updated).await?;
            *entries = updated;
        }
        Ok(removed)
    }

    /// `None` when nothing is cached for `file` or `current` points at
    /// another server or catalog than the cached original
    pub async fn has_identity_changed(&self, file: &Path, current: &CloudConnectionPayload) -> Option<bool> {
        self.get(file)
            .await
            .filter(|entry| entry.payload.same_endpoint(current))
            .map(|entry| entry.fingerprint != current.fingerprint())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(database: &str) -> CloudConnectionPayload {
        CloudConnectionPayload {
            connection_string: "Data Source=powerbi://api.powerbi.com/v1.0/myorg/Sales;Initial Catalog=SalesModel"
                .to_string(),
            connection_type: Some("pbiServiceXmlaStyleLive".to_string()),
            pbi_service_model_id: None,
            pbi_model_virtual_server_name: Some("sobe_wowvirtualserver".to_string()),
            pbi_model_database_name: Some(database.to_string()),
            name: Some("EntityDataSource".to_string()),
        }
    }

    #[test]
    fn test_fingerprint_ignores_connection_string() {
        let a = payload("guid-1");
        let mut b = a.clone();
        b.connection_string = "Data Source=elsewhere".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), payload("guid-2").fingerprint());
    }

    #[tokio::test]
    async fn test_remember_persists_and_detects_republish() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("cache.json");
        let report = dir.path().join("Report").join("definition.pbir");

        let store = CacheStore::load(store_path.clone()).await;
        store.remember(&report, payload("guid-1")).await.unwrap();

        let reloaded = CacheStore::load(store_path).await;
        assert_eq!(reloaded.len().await, 1);
        assert_eq!(reloaded.has_identity_changed(&report, &payload("guid-1")).await, Some(false));
        assert_eq!(reloaded.has_identity_changed(&report, &payload("guid-2")).await, Some(true));

        let mut moved = payload("guid-2");
        moved.connection_string = "Data Source=powerbi://api.powerbi.com/v1.0/myorg/Dev;Initial Catalog=DevModel".to_string();
        assert_eq!(reloaded.has_identity_changed(&report, &moved).await, None);

        assert!(reloaded.forget(&report).await.unwrap());
        assert_eq!(reloaded.has_identity_changed(&report, &payload("guid-1")).await, None);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = tokio_test::block_on(CacheStore::load(dir.path().join("absent.json")));
        assert_eq!(tokio_test::block_on(store.len()), 0);
        assert!(tokio_test::block_on(store.get(Path::new("nowhere.pbir"))).is_none());
    }
}
