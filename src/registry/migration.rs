//! One-shot import of the legacy JSON registry.
//!
//! Earlier hosts kept container records in a flat JSON file at
//! `$WOPR_HOME/sandbox/containers.json` with an `entries` array. On plugin
//! init that file, if present, is imported into the repository and renamed
//! to `<path>.backup` so the import never runs twice. Individual entries
//! that fail validation are skipped with a warning; file-level failures
//! (unreadable, unparseable, rename failed) propagate and abort init.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{RegistryStore, SandboxRegistryRecord};
use crate::error::MigrationError;

/// Imports the legacy registry file into `store`, returning the number of
/// records migrated. A missing file is a no-op.
///
/// # Errors
///
/// Returns `MigrationError` if the file cannot be read, parsed as JSON, or
/// renamed aside after the import, or if the repository rejects a write.
pub async fn migrate_legacy_registry(
    store: &dyn RegistryStore,
    path: &Path,
) -> Result<usize, MigrationError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no legacy registry to migrate");
            return Ok(0);
        }
        Err(e) => {
            return Err(MigrationError::Read {
                path: path.display().to_string(),
                source: e,
            });
        }
    };

    let parsed: Value = serde_json::from_str(&content).map_err(|e| MigrationError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let entries = match parsed.get("entries").and_then(Value::as_array) {
        Some(entries) => entries.clone(),
        None => {
            warn!(path = %path.display(), "legacy registry has no entries array");
            Vec::new()
        }
    };

    let mut migrated = 0usize;
    for entry in entries {
        match serde_json::from_value::<SandboxRegistryRecord>(entry) {
            Ok(record) => {
                store.put(record).await?;
                migrated += 1;
            }
            Err(e) => {
                warn!(error = %e, "skipping invalid legacy registry entry");
            }
        }
    }

    let backup = backup_path(path);
    tokio::fs::rename(path, &backup)
        .await
        .map_err(|e| MigrationError::Rename {
            from: path.display().to_string(),
            to: backup.display().to_string(),
            source: e,
        })?;

    info!(
        migrated,
        backup = %backup.display(),
        "legacy sandbox registry migrated"
    );
    Ok(migrated)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}
