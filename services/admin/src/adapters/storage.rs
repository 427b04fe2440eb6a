//! services/admin/src/adapters/storage.rs
//!
//! `KeyValueStore` adapters: a JSON file that survives process restarts and
//! an in-memory map for tests and throwaway sessions.

use async_trait::async_trait;
use coaching_admin_core::ports::{KeyValueStore, PortError, PortResult};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

//=========================================================================================
// File-backed store
//=========================================================================================

/// Stores all keys as one JSON object in a single file.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_bytes(&self) -> PortResult<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    async fn read_entries(&self) -> PortResult<BTreeMap<String, String>> {
        parse_entries(&self.read_bytes().await?).map_err(|e| {
            PortError::Storage(format!("{} is corrupt: {}", self.path.display(), e))
        })
    }

    /// Like `read_entries`, but a corrupt file counts as empty so that
    /// writes replace it instead of failing forever.
    async fn entries_for_update(&self) -> PortResult<BTreeMap<String, String>> {
        let bytes = self.read_bytes().await?;
        Ok(parse_entries(&bytes).unwrap_or_else(|error| {
            warn!(path = %self.path.display(), %error, "Token store is corrupt; discarding it");
            BTreeMap::new()
        }))
    }

    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> PortResult<()> {
        if entries.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(storage_error(&self.path, e)),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| PortError::Storage(e.to_string()))?;

        // Write next to the target and rename, so a crash never leaves half a file.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, e))
    }
}

fn parse_entries(bytes: &[u8]) -> serde_json::Result<BTreeMap<String, String>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(bytes)
}

fn storage_error(path: &Path, error: std::io::Error) -> PortError {
    PortError::Storage(format!("{}: {}", path.display(), error))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> PortResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| storage_error(path, e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> PortResult<()> {
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.read_entries().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries_for_update().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, keys: &[&str]) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries_for_update().await?;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() == before && !entries.is_empty() {
            return Ok(());
        }
        self.write_entries(&entries).await
    }
}

//=========================================================================================
// In-memory store
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> PortResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
