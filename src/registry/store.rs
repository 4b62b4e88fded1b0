//! Registry storage seam.
//!
//! The host platform provides the real repository; [`RegistryStore`] is the
//! surface it implements. [`JsonFileStore`] is the bundled implementation
//! used by the operator CLI and the test suites: an in-memory index
//! persisted as a JSON array with atomic writes (temp file, fsync, rename)
//! so a crash never leaves a torn registry behind.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::SandboxRegistryRecord;
use crate::error::RegistryError;

/// CRUD surface of the per-container registry, keyed by container name.
///
/// `insert` must fail with [`RegistryError::Conflict`] when a record with
/// the same primary key exists, so the upsert layer can retry a lost race
/// as an update. The implementation is expected to serialize its own
/// writes.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Looks up a record by primary key.
    async fn find(&self, container_name: &str)
        -> Result<Option<SandboxRegistryRecord>, RegistryError>;

    /// Inserts a new record; fails with `Conflict` if the key exists.
    async fn insert(&self, record: SandboxRegistryRecord) -> Result<(), RegistryError>;

    /// Writes a record unconditionally.
    async fn put(&self, record: SandboxRegistryRecord) -> Result<(), RegistryError>;

    /// Deletes by primary key; deleting an absent key succeeds.
    async fn remove(&self, container_name: &str) -> Result<(), RegistryError>;

    /// Returns every record.
    async fn list(&self) -> Result<Vec<SandboxRegistryRecord>, RegistryError>;
}

/// File-backed registry store persisting a JSON array of records.
#[derive(Debug)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
    records: Mutex<BTreeMap<String, SandboxRegistryRecord>>,
}

impl JsonFileStore {
    /// Opens (or creates) a store at `path`, loading any existing records.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if the file exists but cannot be read or
    /// parsed.
    pub async fn open(path: PathBuf) -> Result<Self, RegistryError> {
        let mut records = BTreeMap::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let parsed: Vec<SandboxRegistryRecord> =
                    serde_json::from_str(&content).map_err(|e| RegistryError::Encode {
                        context: format!("failed to parse registry file {}", path.display()),
                        source: e,
                    })?;
                for record in parsed {
                    records.insert(record.id.clone(), record);
                }
                debug!(count = records.len(), path = %path.display(), "loaded registry file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RegistryError::Io {
                    context: format!("failed to read registry file {}", path.display()),
                    source: e,
                });
            }
        }
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    /// An unpersisted store. Used by tests and available to hosts that keep
    /// their own durable copy.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Writes the full record set to disk atomically.
    async fn persist(
        &self,
        records: &BTreeMap<String, SandboxRegistryRecord>,
    ) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::Io {
                    context: format!("failed to create registry directory {}", parent.display()),
                    source: e,
                })?;
        }

        let all: Vec<&SandboxRegistryRecord> = records.values().collect();
        let json = serde_json::to_string_pretty(&all).map_err(|e| RegistryError::Encode {
            context: "failed to serialize registry".to_string(),
            source: e,
        })?;

        // Write to a temp file first, then rename over the target so readers
        // never observe a partial registry.
        let temp_path = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| RegistryError::Io {
                context: format!("failed to create temp registry file {}", temp_path.display()),
                source: e,
            })?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| RegistryError::Io {
                context: format!("failed to write registry file {}", temp_path.display()),
                source: e,
            })?;
        file.sync_all().await.map_err(|e| RegistryError::Io {
            context: "failed to sync registry file".to_string(),
            source: e,
        })?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| RegistryError::Io {
                context: format!(
                    "failed to rename {} to {}",
                    temp_path.display(),
                    path.display()
                ),
                source: e,
            })?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn find(
        &self,
        container_name: &str,
    ) -> Result<Option<SandboxRegistryRecord>, RegistryError> {
        Ok(self.records.lock().await.get(container_name).cloned())
    }

    async fn insert(&self, record: SandboxRegistryRecord) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.id) {
            return Err(RegistryError::Conflict {
                id: record.id.clone(),
            });
        }
        records.insert(record.id.clone(), record);
        self.persist(&records).await
    }

    async fn put(&self, record: SandboxRegistryRecord) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        records.insert(record.id.clone(), record);
        self.persist(&records).await
    }

    async fn remove(&self, container_name: &str) -> Result<(), RegistryError> {
        let mut records = self.records.lock().await;
        if records.remove(container_name).is_some() {
            self.persist(&records).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SandboxRegistryRecord>, RegistryError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> SandboxRegistryRecord {
        SandboxRegistryRecord {
            id: name.to_string(),
            container_name: name.to_string(),
            session_key: "dev".to_string(),
            created_at_ms: 1,
            last_used_at_ms: 1,
            image: "img".to_string(),
            config_hash: None,
        }
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let store = JsonFileStore::in_memory();
        store.insert(record("a")).await.unwrap();
        let err = store.insert(record("a")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { id } if id == "a"));
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.json");

        let store = JsonFileStore::open(path.clone()).await.unwrap();
        store.insert(record("a")).await.unwrap();
        store.insert(record("b")).await.unwrap();
        store.remove("a").await.unwrap();

        let reloaded = JsonFileStore::open(path).await.unwrap();
        let all = reloaded.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "b");
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = JsonFileStore::open(path).await.unwrap_err();
        assert!(matches!(err, RegistryError::Encode { .. }));
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() {
        let store = JsonFileStore::in_memory();
        store.remove("ghost").await.unwrap();
    }
}
