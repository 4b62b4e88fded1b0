//! Container lifecycle orchestration.
//!
//! `ensure_sandbox_container` is the single path by which sessions obtain a
//! running container: it derives the stable name, detects config drift via
//! the label/registry hash, recreates cold drifted containers, starts
//! stopped ones, and records the pass in the registry. A drifted container
//! that is running and was used within the last five minutes is left
//! untouched (someone is probably in it); the warning names the recreate
//! command as the escape hatch.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::config::{compute_sandbox_config_hash, SandboxConfig, SandboxScope};
use crate::constants::{CONTAINER_NAME_MAX_LEN, HOT_WINDOW_MS, SHARED_SCOPE_KEY};
use crate::docker::{
    create_container, docker_container_state, exec_docker, read_container_config_hash,
    CreateContainerParams, NAME_CONFLICT_MARKER,
};
use crate::error::{DockerError, Error, Result};
use crate::naming::{resolve_sandbox_scope_key, slugify_session_key};
use crate::registry::{
    find_registry_entry, update_registry_entry, RegistryStore, RegistryUpdate,
};

/// Inputs for one ensure pass.
#[derive(Debug, Clone)]
pub struct EnsureContainer<'a> {
    /// The session's key (typically its name); scope resolution may replace
    /// it with the shared key.
    pub session_key: &'a str,
    /// Host workspace directory to mount.
    pub workspace_dir: &'a Path,
    /// Fully resolved configuration.
    pub cfg: &'a SandboxConfig,
}

/// Deterministic container name for a session under a config.
///
/// Shared scope uses the literal shared key as the slug; session scope
/// slugs the scope key. The prefixed name is capped at Docker's 63-char
/// limit.
#[must_use]
pub fn sandbox_container_name(cfg: &SandboxConfig, session_key: &str) -> String {
    let scope_key = resolve_sandbox_scope_key(cfg.scope, session_key);
    let slug = match cfg.scope {
        SandboxScope::Shared => SHARED_SCOPE_KEY.to_string(),
        SandboxScope::Session => slugify_session_key(&scope_key),
    };
    format!("{}{}", cfg.docker.container_prefix, slug)
        .chars()
        .take(CONTAINER_NAME_MAX_LEN)
        .collect()
}

/// Ensures the scope's container exists, matches the effective config (or
/// is deliberately left drifted, see module docs), and is running. Returns
/// the container name.
///
/// # Errors
///
/// Fails when Docker operations fail or the registry cannot be written. On
/// success the returned container is running, except in the hot-drift path
/// which returns the already running drifted container.
#[instrument(skip(store, params), fields(session_key = params.session_key))]
pub async fn ensure_sandbox_container(
    store: &dyn RegistryStore,
    params: EnsureContainer<'_>,
) -> Result<String> {
    let cfg = params.cfg;
    let scope_key = resolve_sandbox_scope_key(cfg.scope, params.session_key);
    let name = sandbox_container_name(cfg, params.session_key);

    let expected_hash =
        compute_sandbox_config_hash(&cfg.docker, cfg.workspace_access, params.workspace_dir);

    let mut state = docker_container_state(&name).await?;
    let mut hot_drift_hash: Option<Option<String>> = None;

    if state.exists {
        let entry = find_registry_entry(store, &name).await?;
        let current_hash = match read_container_config_hash(&name).await? {
            Some(label) => Some(label),
            None => entry.as_ref().and_then(|e| e.config_hash.clone()),
        };

        if current_hash.as_deref() != Some(expected_hash.as_str()) {
            let now = chrono::Utc::now().timestamp_millis();
            let recently_used = entry
                .as_ref()
                .map(|e| now - e.last_used_at_ms < HOT_WINDOW_MS);
            // A running container with no usage record is treated as hot:
            // better to warn than to yank a container out from under a
            // session we cannot date.
            let hot = state.running && recently_used.unwrap_or(true);

            if hot {
                warn!(
                    container = %name,
                    "sandbox config changed but the container was used recently; \
                     keeping it. Run `wopr-sandbox recreate --session {}` to apply \
                     the new configuration",
                    params.session_key
                );
                hot_drift_hash = Some(current_hash);
            } else {
                info!(container = %name, "config drift detected, recreating container");
                exec_docker(&["rm".to_string(), "-f".to_string(), name.clone()], true).await?;
                state = crate::docker::ContainerState {
                    exists: false,
                    running: false,
                };
            }
        }
    }

    if !state.exists {
        let created = create_container(CreateContainerParams {
            name: &name,
            cfg: &cfg.docker,
            scope_key: &scope_key,
            workspace_dir: params.workspace_dir,
            workspace_access: cfg.workspace_access,
            created_at_ms: None,
            config_hash: Some(&expected_hash),
        })
        .await;

        if let Err(e) = created {
            let name_conflict = matches!(
                &e,
                Error::Docker(DockerError::CommandFailed { stderr })
                    if stderr.contains(NAME_CONFLICT_MARKER)
            );
            if !name_conflict {
                return Err(e);
            }
            // Another session raced us to create this scope's container.
            // Adopt the winner's container instead of failing.
            debug!(container = %name, "create lost a name race, adopting existing container");
            let current = docker_container_state(&name).await?;
            if !current.exists {
                return Err(e);
            }
            if !current.running {
                exec_docker(&["start".to_string(), name.clone()], false).await?;
            }
        }
    } else if !state.running {
        debug!(container = %name, "starting stopped container");
        exec_docker(&["start".to_string(), name.clone()], false).await?;
    }

    let now = chrono::Utc::now().timestamp_millis();
    let config_hash = match hot_drift_hash {
        // Hot drift: re-record the pre-drift hash so the next cold check
        // still sees the mismatch.
        Some(existing) => existing,
        None => Some(expected_hash),
    };
    update_registry_entry(
        store,
        RegistryUpdate {
            container_name: name.clone(),
            session_key: scope_key,
            now_ms: now,
            image: cfg.docker.image.clone(),
            config_hash,
        },
    )
    .await?;

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_sandbox_config;

    fn config(scope: &str, prefix: &str) -> SandboxConfig {
        let main = serde_json::json!({
            "sandbox": {
                "mode": "all",
                "scope": scope,
                "docker": {"containerPrefix": prefix}
            }
        });
        resolve_sandbox_config("dev", None, &main)
    }

    #[test]
    fn test_container_name_session_scope() {
        let cfg = config("session", "wopr-sbx-");
        let name = sandbox_container_name(&cfg, "My Session");
        assert!(name.starts_with("wopr-sbx-my-session-"), "got {name}");
        assert!(name.len() <= 63);
    }

    #[test]
    fn test_container_name_shared_scope() {
        let cfg = config("shared", "wopr-sbx-");
        assert_eq!(sandbox_container_name(&cfg, "anything"), "wopr-sbx-shared");
    }

    #[test]
    fn test_container_name_capped_at_63() {
        let long_prefix = "p".repeat(60);
        let cfg = config("session", &long_prefix);
        let name = sandbox_container_name(&cfg, "some-session");
        assert_eq!(name.len(), 63);
    }

    #[test]
    fn test_container_name_deterministic() {
        let cfg = config("session", "wopr-sbx-");
        assert_eq!(
            sandbox_container_name(&cfg, "dev"),
            sandbox_container_name(&cfg, "dev")
        );
    }

    #[test]
    fn test_container_name_blank_session_maps_to_main() {
        let cfg = config("session", "wopr-sbx-");
        let name = sandbox_container_name(&cfg, "   ");
        assert!(name.starts_with("wopr-sbx-main-"), "got {name}");
    }
}
