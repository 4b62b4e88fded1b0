//! Top-level session entry points.
//!
//! `resolve_sandbox_context` is what the host calls per session: it decides
//! whether to sandbox at all, resolves the effective configuration, gives
//! pruning a debounced chance to run, prepares the workspace directory,
//! ensures the container, and hands back everything the caller needs for
//! in-container execution.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, instrument};

use super::lifecycle::{ensure_sandbox_container, sandbox_container_name, EnsureContainer};
use super::prune::maybe_prune;
use super::workspace::{ensure_workspace_dir, sandbox_workspace_dir};
use crate::config::{
    resolve_sandbox_config, should_sandbox, ResolvedToolPolicy, SandboxDockerConfig, TrustLevel,
    WorkspaceAccess,
};
use crate::docker::exec_docker;
use crate::error::Result;
use crate::naming::resolve_sandbox_scope_key;
use crate::registry::remove_registry_entry;
use crate::runtime::runtime;

/// Everything a caller needs to run commands in a session's sandbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxContext {
    pub enabled: bool,
    pub session_key: String,
    pub workspace_dir: PathBuf,
    pub workspace_access: WorkspaceAccess,
    pub container_name: String,
    pub container_workdir: String,
    pub docker: SandboxDockerConfig,
    pub tools: ResolvedToolPolicy,
}

/// Workspace placement for a session, derivable without touching Docker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxWorkspaceInfo {
    pub sandboxed: bool,
    pub scope_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
    pub workspace_access: WorkspaceAccess,
}

/// A session asking for its sandbox.
#[derive(Debug, Clone, Copy)]
pub struct SessionRequest<'a> {
    pub session_name: &'a str,
    pub trust_level: Option<TrustLevel>,
}

/// Resolves the full sandbox context for a session, creating or repairing
/// the container as needed. Returns `None` when the session is not
/// sandboxed under the current configuration.
///
/// # Errors
///
/// Fails when the workspace directory cannot be created, Docker operations
/// fail, or the registry cannot be written.
#[instrument(skip(request), fields(session = request.session_name))]
pub async fn resolve_sandbox_context(
    request: SessionRequest<'_>,
) -> Result<Option<SandboxContext>> {
    let main_config = runtime().main_config();
    if !should_sandbox(request.session_name, request.trust_level, &main_config) {
        debug!("session is not sandboxed");
        return Ok(None);
    }

    let cfg = resolve_sandbox_config(request.session_name, request.trust_level, &main_config);
    let store = runtime().store();

    maybe_prune(store.as_ref(), &cfg.prune).await;

    let scope_key = resolve_sandbox_scope_key(cfg.scope, request.session_name);
    let workspace_dir = sandbox_workspace_dir(&cfg, &scope_key);
    ensure_workspace_dir(&workspace_dir).await?;

    let container_name = ensure_sandbox_container(
        store.as_ref(),
        EnsureContainer {
            session_key: request.session_name,
            workspace_dir: &workspace_dir,
            cfg: &cfg,
        },
    )
    .await?;

    Ok(Some(SandboxContext {
        enabled: true,
        session_key: scope_key,
        workspace_dir,
        workspace_access: cfg.workspace_access,
        container_name,
        container_workdir: cfg.docker.workdir.clone(),
        docker: cfg.docker,
        tools: cfg.tools,
    }))
}

/// Same sandboxing decision and workspace derivation as
/// [`resolve_sandbox_context`], without touching Docker or the filesystem.
#[must_use]
pub fn get_sandbox_workspace_info(request: SessionRequest<'_>) -> SandboxWorkspaceInfo {
    let main_config = runtime().main_config();
    if !should_sandbox(request.session_name, request.trust_level, &main_config) {
        return SandboxWorkspaceInfo {
            sandboxed: false,
            scope_key: request.session_name.to_string(),
            workspace_dir: None,
            workspace_access: WorkspaceAccess::None,
        };
    }

    let cfg = resolve_sandbox_config(request.session_name, request.trust_level, &main_config);
    let scope_key = resolve_sandbox_scope_key(cfg.scope, request.session_name);
    let workspace_dir = sandbox_workspace_dir(&cfg, &scope_key);
    SandboxWorkspaceInfo {
        sandboxed: true,
        scope_key,
        workspace_dir: Some(workspace_dir),
        workspace_access: cfg.workspace_access,
    }
}

/// Force-recreates a session's container with the current effective config.
///
/// This is the operator escape hatch the hot-drift warning points at: the
/// existing container is removed unconditionally, its registry record is
/// dropped, and a fresh ensure pass builds the replacement. Returns `None`
/// when the session is not sandboxed.
///
/// # Errors
///
/// Fails as [`resolve_sandbox_context`] does.
#[instrument(skip(request), fields(session = request.session_name))]
pub async fn recreate_sandbox_container(
    request: SessionRequest<'_>,
) -> Result<Option<SandboxContext>> {
    let main_config = runtime().main_config();
    if !should_sandbox(request.session_name, request.trust_level, &main_config) {
        return Ok(None);
    }

    let cfg = resolve_sandbox_config(request.session_name, request.trust_level, &main_config);
    let name = sandbox_container_name(&cfg, request.session_name);

    debug!(container = %name, "force-removing container for recreate");
    exec_docker(&["rm".to_string(), "-f".to_string(), name.clone()], true).await?;
    remove_registry_entry(runtime().store().as_ref(), &name).await?;

    resolve_sandbox_context(request).await
}
