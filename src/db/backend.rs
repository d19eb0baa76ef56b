// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Key/value backends for the persisted session.
//!
//! Provides:
//! - `FileStore`: a single JSON object on disk, rewritten atomically
//! - `MemoryStore`: process-local storage for tests and ephemeral clients

use crate::error::SessionError;
use anyhow::Context;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A single write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set(&'static str, String),
    Remove(&'static str),
}

/// Durable string key/value storage.
///
/// `apply` must make the whole batch visible at once: a reader never sees a
/// token from one batch next to a user record from another.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, SessionError>>;

    fn apply(&self, ops: Vec<StoreOp>) -> BoxFuture<'_, Result<(), SessionError>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// FileStore
// ─────────────────────────────────────────────────────────────────────────────

/// JSON-file backed store. Survives process restarts.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            SessionError::Storage(format!("Corrupt store {}: {}", self.path.display(), e))
        })
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        let json = serde_json::to_vec_pretty(entries).context("serializing session store")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Storage(e.to_string()))?;
        }

        // Write to a sibling file and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to replace store: {}", e)))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, SessionError>> {
        Box::pin(async move {
            let entries = self.read_all().await?;
            Ok(entries.get(key).cloned())
        })
    }

    fn apply(&self, ops: Vec<StoreOp>) -> BoxFuture<'_, Result<(), SessionError>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;

            // A corrupt file is replaced rather than blocking every future write.
            let mut entries = match self.read_all().await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable session store");
                    BTreeMap::new()
                }
            };

            for op in ops {
                match op {
                    StoreOp::Set(key, value) => {
                        entries.insert(key.to_string(), value);
                    }
                    StoreOp::Remove(key) => {
                        entries.remove(key);
                    }
                }
            }

            self.write_all(&entries).await
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access for tests that need to plant or inspect raw values.
    pub fn raw(&self) -> &DashMap<String, String> {
        &self.entries
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, SessionError>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|v| v.value().clone())) })
    }

    fn apply(&self, ops: Vec<StoreOp>) -> BoxFuture<'_, Result<(), SessionError>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            for op in ops {
                match op {
                    StoreOp::Set(key, value) => {
                        self.entries.insert(key.to_string(), value);
                    }
                    StoreOp::Remove(key) => {
                        self.entries.remove(key);
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        store
            .apply(vec![
                StoreOp::Set("a", "1".to_string()),
                StoreOp::Set("b", "2".to_string()),
            ])
            .await
            .unwrap();
        store.apply(vec![StoreOp::Remove("a")]).await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn file_store_reports_corruption_then_recovers_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("a").await, Err(SessionError::Storage(_))));

        store
            .apply(vec![StoreOp::Set("a", "1".to_string())])
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("anything").await.unwrap(), None);
    }
}
