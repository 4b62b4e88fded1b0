//! Persistent per-container registry.
//!
//! One record per container, keyed by container name, surviving host
//! restarts. The eviction and drift logic read it; the lifecycle
//! orchestrator writes it after every successful ensure. Inspection of the
//! real container is authoritative for existence and running state; the
//! record is authoritative for `createdAtMs`, `image` and the last known
//! config hash.

pub mod migration;
pub mod store;

pub use store::{JsonFileStore, RegistryStore};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;

/// Identity of the repository table this registry occupies in the host's
/// storage, for hosts that register schemas up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryTableSpec {
    pub namespace: &'static str,
    pub table: &'static str,
    pub version: u32,
    pub primary_key: &'static str,
    pub indexes: &'static [&'static str],
}

/// Schema registration constants for the sandbox registry table.
pub const REGISTRY_TABLE: RegistryTableSpec = RegistryTableSpec {
    namespace: "sandbox",
    table: "sandbox_registry",
    version: 1,
    primary_key: "id",
    indexes: &["sessionKey", "containerName", "lastUsedAtMs"],
};

/// A persisted container record. `id` always equals `container_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRegistryRecord {
    pub id: String,
    pub container_name: String,
    pub session_key: String,
    pub created_at_ms: i64,
    pub last_used_at_ms: i64,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// The mutable slice of a record a lifecycle pass writes.
#[derive(Debug, Clone)]
pub struct RegistryUpdate {
    pub container_name: String,
    pub session_key: String,
    /// Wall-clock time of the pass; used for `last_used_at_ms` always and
    /// for `created_at_ms` on first insert.
    pub now_ms: i64,
    pub image: String,
    /// New config hash; `None` preserves whatever is stored.
    pub config_hash: Option<String>,
}

impl RegistryUpdate {
    fn into_fresh_record(self) -> SandboxRegistryRecord {
        SandboxRegistryRecord {
            id: self.container_name.clone(),
            container_name: self.container_name,
            session_key: self.session_key,
            created_at_ms: self.now_ms,
            last_used_at_ms: self.now_ms,
            image: self.image,
            config_hash: self.config_hash,
        }
    }

    fn merge_onto(self, existing: SandboxRegistryRecord) -> SandboxRegistryRecord {
        SandboxRegistryRecord {
            id: existing.id,
            container_name: existing.container_name,
            session_key: self.session_key,
            // First-insert values are immutable across upserts.
            created_at_ms: existing.created_at_ms,
            last_used_at_ms: self.now_ms,
            image: existing.image,
            config_hash: self.config_hash.or(existing.config_hash),
        }
    }
}

/// Upserts a registry record.
///
/// Existing records keep their `created_at_ms` and `image`; `session_key`
/// and `last_used_at_ms` always take the new values, and `config_hash`
/// takes the new value only when one is provided. An insert that loses a
/// race to a concurrent writer is retried once as an update.
pub async fn update_registry_entry(
    store: &dyn RegistryStore,
    update: RegistryUpdate,
) -> Result<SandboxRegistryRecord, RegistryError> {
    let name = update.container_name.clone();
    match store.find(&name).await? {
        Some(existing) => {
            let merged = update.merge_onto(existing);
            store.put(merged.clone()).await?;
            Ok(merged)
        }
        None => {
            let fresh = update.clone().into_fresh_record();
            match store.insert(fresh.clone()).await {
                Ok(()) => Ok(fresh),
                Err(RegistryError::Conflict { .. }) => {
                    debug!(container = %name, "registry insert raced, retrying as update");
                    let existing = store.find(&name).await?.ok_or_else(|| {
                        RegistryError::Conflict { id: name.clone() }
                    })?;
                    let merged = update.merge_onto(existing);
                    store.put(merged.clone()).await?;
                    Ok(merged)
                }
                Err(other) => Err(other),
            }
        }
    }
}

/// Removes a record; absent records are not an error.
pub async fn remove_registry_entry(
    store: &dyn RegistryStore,
    container_name: &str,
) -> Result<(), RegistryError> {
    store.remove(container_name).await
}

/// Looks up a record by container name.
pub async fn find_registry_entry(
    store: &dyn RegistryStore,
    container_name: &str,
) -> Result<Option<SandboxRegistryRecord>, RegistryError> {
    store.find(container_name).await
}

/// Lists every known record.
pub async fn list_registry_entries(
    store: &dyn RegistryStore,
) -> Result<Vec<SandboxRegistryRecord>, RegistryError> {
    store.list().await
}
