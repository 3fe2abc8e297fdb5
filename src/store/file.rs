//! Versioned JSON files with atomic replacement.
//!
//! Every document carries a top-level `version`. Writers go through a temp
//! file in the same directory followed by a rename, so readers never observe
//! a partial write.

use super::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Schema version of every persisted document
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// Lower-cased absolute path with forward slashes, used as a store key
pub fn normalize_path(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Write bytes via temp file + rename (blocking)
pub fn write_bytes_atomic_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp = temp_path_for(path);
    let result = (|| {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

/// Write bytes via temp file + rename
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp = temp_path_for(path);
    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

/// Persist `data` wrapped in a versioned envelope
pub async fn save_document<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(&Envelope {
        version: STORE_VERSION,
        data,
    })?;
    write_bytes_atomic(path, &bytes).await?;
    Ok(())
}

/// Load a versioned document.
///
/// A missing file, an unparseable file or a version mismatch all yield
/// `T::default()`; the file on disk is left untouched.
pub async fn load_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            return T::default();
        }
    };

    let value: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring unreadable store file {}: {}", path.display(), e);
            return T::default();
        }
    };

    let version = value.get("version").and_then(|v| v.as_u64());
    if version != Some(STORE_VERSION as u64) {
        warn!(
            "Store file {} has version {:?}, expected {}; starting empty",
            path.display(),
            version,
            STORE_VERSION
        );
        return T::default();
    }

    match serde_json::from_value::<Envelope<T>>(value) {
        Ok(envelope) => envelope.data,
        Err(e) => {
            warn!("Ignoring malformed store file {}: {}", path.display(), e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_normalize_path() {
        let key = normalize_path(Path::new("/Work/Reports/Sales.BIM"));
        assert_eq!(key, "/work/reports/sales.bim");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        let mut data = HashMap::new();
        data.insert("a".to_string(), 1u32);
        save_document(&path, &data).await.unwrap();

        let loaded: HashMap<String, u32> = load_document(&path).await;
        assert_eq!(loaded.get("a"), Some(&1));

        // no temp files left behind
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_version_mismatch_starts_empty_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, br#"{"version": 99, "data": {"a": 1}}"#).unwrap();

        let loaded: HashMap<String, u32> = load_document(&path).await;
        assert!(loaded.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_garbage_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, b"not json").unwrap();

        let loaded: Vec<String> = load_document(&path).await;
        assert!(loaded.is_empty());
    }
}
