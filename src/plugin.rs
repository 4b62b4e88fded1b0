//! Plugin surface for the host runtime.
//!
//! The host initializes the plugin once with its repository handle and a
//! getter for the merged configuration, then calls the exposed operations
//! through the `sandbox` extension namespace. Shutdown is idempotent and
//! best-effort tears down every container the registry knows about.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::constants::legacy_registry_path;
use crate::error::Result;
use crate::registry::migration::migrate_legacy_registry;
use crate::registry::RegistryStore;
use crate::runtime::{init_runtime, try_runtime, MainConfigGetter};
use crate::sandbox::prune_all;

/// Static plugin identity reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginManifest {
    pub name: &'static str,
    pub version: &'static str,
    pub category: &'static str,
    pub capabilities: &'static [&'static str],
}

/// This plugin's manifest.
pub const PLUGIN_MANIFEST: PluginManifest = PluginManifest {
    name: "wopr-plugin-sandbox",
    version: "1.0.0",
    category: "infrastructure",
    capabilities: &["sandbox"],
};

/// Extension namespace the operations are registered under.
pub const EXTENSION_NAMESPACE: &str = "sandbox";

/// Operations exposed through the extension namespace, by host-facing name.
pub const EXTENSION_OPERATIONS: &[&str] = &[
    "resolveSandboxContext",
    "getSandboxWorkspaceInfo",
    "execInContainer",
    "execInContainerRaw",
    "execDocker",
    "shouldSandbox",
    "resolveSandboxConfig",
    "isToolAllowed",
    "filterToolsByPolicy",
    "pruneAllSandboxes",
    "recreateSandboxContainer",
];

static SHUTDOWN_DONE: AtomicBool = AtomicBool::new(false);

/// Initializes the plugin: installs the runtime context and imports the
/// legacy JSON registry if one is present.
///
/// # Errors
///
/// Fails when called twice or when the legacy migration fails; either
/// aborts plugin init on the host side.
#[instrument(skip(store, main_config))]
pub async fn init(
    store: Arc<dyn RegistryStore>,
    main_config: Arc<MainConfigGetter>,
) -> Result<()> {
    init_runtime(store.clone(), main_config)?;

    let migrated = migrate_legacy_registry(store.as_ref(), &legacy_registry_path()).await?;
    if migrated > 0 {
        info!(migrated, "imported legacy sandbox registry");
    }

    info!(
        name = PLUGIN_MANIFEST.name,
        version = PLUGIN_MANIFEST.version,
        "sandbox plugin initialized"
    );
    Ok(())
}

/// Shuts the plugin down, purging all sandbox containers best-effort.
/// Safe to call repeatedly and before init.
#[instrument]
pub async fn shutdown() {
    if SHUTDOWN_DONE.swap(true, Ordering::SeqCst) {
        return;
    }
    let Some(runtime) = try_runtime() else {
        return;
    };
    match prune_all(runtime.store().as_ref()).await {
        Ok(count) => info!(count, "sandbox plugin shut down"),
        Err(e) => warn!(error = %e, "sandbox teardown failed during shutdown"),
    }
}
