//! Docker-based session isolation for the WOPR agent host.
//!
//! Untrusted and semi-trusted agent sessions are confined to long-lived
//! Docker containers with dropped capabilities, a read-only root, and a
//! controlled workspace mount. Per session the crate establishes a stable
//! container identity, ensures the container exists in the effective
//! configuration, records its lifecycle in a persistent registry, and
//! garbage-collects idle or aged containers.
//!
//! # Architecture
//!
//! ```text
//! resolve_sandbox_context          (per-session entry)
//!   ├── config::resolve            (default ← global ← session merge)
//!   ├── sandbox::prune             (debounced idle/age reclamation)
//!   ├── sandbox::workspace         (host directory preparation)
//!   └── sandbox::lifecycle         (ensure container)
//!         ├── config::hash         (drift fingerprint)
//!         ├── registry             (persistent per-container records)
//!         └── docker               (CLI driver: create/start/rm/exec)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wopr_plugin_sandbox::registry::JsonFileStore;
//! use wopr_plugin_sandbox::sandbox::{resolve_sandbox_context, SessionRequest};
//!
//! #[tokio::main]
//! async fn main() -> wopr_plugin_sandbox::Result<()> {
//!     let store = Arc::new(JsonFileStore::in_memory());
//!     let config = Arc::new(|| serde_json::json!({"sandbox": {"mode": "all"}}));
//!     wopr_plugin_sandbox::plugin::init(store, config).await?;
//!
//!     let context = resolve_sandbox_context(SessionRequest {
//!         session_name: "dev",
//!         trust_level: None,
//!     })
//!     .await?;
//!
//!     if let Some(context) = context {
//!         println!("container: {}", context.container_name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod docker;
pub mod error;
pub mod naming;
pub mod plugin;
pub mod policy;
pub mod registry;
pub mod runtime;
pub mod sandbox;
pub mod shell;

// Re-export the host-facing surface.
pub use config::{
    compute_sandbox_config_hash, resolve_sandbox_config, should_sandbox, SandboxConfig,
    SandboxDockerConfig, SandboxMode, SandboxScope, SandboxToolPolicy, TrustLevel,
    WorkspaceAccess,
};
pub use docker::{exec_docker, exec_in_container, exec_in_container_raw};
pub use error::{Error, Result};
pub use policy::{filter_tools_by_policy, is_tool_allowed};
pub use sandbox::{
    get_sandbox_workspace_info, recreate_sandbox_container, resolve_sandbox_context,
    SandboxContext, SessionRequest,
};
