//! Per-session workspace directories on the host.
//!
//! Session scope gets a slugged directory under the workspace root; shared
//! scope mounts the root itself. Directories are created on demand before
//! the container is ensured, so a bind mount never points at a missing
//! path.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::config::{SandboxConfig, SandboxScope};
use crate::error::WorkspaceError;
use crate::naming::resolve_sandbox_workspace_dir;

/// Host directory mounted into the container for this scope.
#[must_use]
pub fn sandbox_workspace_dir(cfg: &SandboxConfig, scope_key: &str) -> PathBuf {
    match cfg.scope {
        SandboxScope::Shared => cfg.workspace_root.clone(),
        SandboxScope::Session => resolve_sandbox_workspace_dir(&cfg.workspace_root, scope_key),
    }
}

/// Creates the workspace directory (and parents) if missing.
///
/// # Errors
///
/// Returns `WorkspaceError::CreateDir` when creation fails.
#[instrument]
pub async fn ensure_workspace_dir(path: &Path) -> Result<(), WorkspaceError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| WorkspaceError::CreateDir {
            path: path.display().to_string(),
            source: e,
        })?;
    debug!("workspace directory ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_sandbox_config;

    fn config_with_scope(scope: &str) -> SandboxConfig {
        let main = serde_json::json!({
            "sandbox": {
                "mode": "all",
                "scope": scope,
                "workspaceRoot": "/srv/wopr/sandboxes"
            }
        });
        resolve_sandbox_config("dev", None, &main)
    }

    #[test]
    fn test_shared_scope_uses_root() {
        let cfg = config_with_scope("shared");
        assert_eq!(
            sandbox_workspace_dir(&cfg, "shared"),
            PathBuf::from("/srv/wopr/sandboxes")
        );
    }

    #[test]
    fn test_session_scope_uses_slug_subdir() {
        let cfg = config_with_scope("session");
        let dir = sandbox_workspace_dir(&cfg, "dev");
        assert!(dir.starts_with("/srv/wopr/sandboxes"));
        assert_ne!(dir, PathBuf::from("/srv/wopr/sandboxes"));
    }

    #[tokio::test]
    async fn test_ensure_workspace_dir_creates_recursively() {
        let base = tempfile::tempdir().expect("tempdir");
        let nested = base.path().join("a").join("b").join("c");
        ensure_workspace_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        // Idempotent.
        ensure_workspace_dir(&nested).await.unwrap();
    }
}
