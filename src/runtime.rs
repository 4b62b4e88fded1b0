//! Process-wide runtime context.
//!
//! The host hands the plugin its repository handle and a getter for the
//! merged host configuration at init. Both are installed once into a
//! process-wide slot and borrowed by every component afterwards; logging
//! goes through the global tracing subscriber the host (or the binary)
//! installs. Re-initialization is rejected, and reading the slot before
//! init is a programmer error.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::RuntimeError;
use crate::registry::RegistryStore;

/// Getter for the host's merged configuration, returned as an opaque JSON
/// object. The sandbox sections are read from it on every resolution so
/// config reloads on the host side are picked up without re-init.
pub type MainConfigGetter = dyn Fn() -> Value + Send + Sync;

/// The injected collaborators every component borrows.
pub struct RuntimeContext {
    store: Arc<dyn RegistryStore>,
    main_config: Arc<MainConfigGetter>,
}

impl RuntimeContext {
    /// The registry repository handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// A fresh snapshot of the host's merged configuration.
    #[must_use]
    pub fn main_config(&self) -> Value {
        (self.main_config)()
    }
}

static RUNTIME: OnceLock<RuntimeContext> = OnceLock::new();

/// Installs the runtime context. Called exactly once at plugin init.
///
/// # Errors
///
/// Returns `RuntimeError::AlreadyInitialized` on a second call.
pub fn init_runtime(
    store: Arc<dyn RegistryStore>,
    main_config: Arc<MainConfigGetter>,
) -> Result<(), RuntimeError> {
    RUNTIME
        .set(RuntimeContext { store, main_config })
        .map_err(|_| RuntimeError::AlreadyInitialized)
}

/// The installed runtime context.
///
/// # Panics
///
/// Panics when called before [`init_runtime`]; storage access before plugin
/// init is a bug in the host integration, not a recoverable condition.
#[must_use]
#[allow(clippy::expect_used)]
pub fn runtime() -> &'static RuntimeContext {
    RUNTIME
        .get()
        .expect("sandbox runtime context used before plugin init")
}

/// The runtime context, if initialized. Shutdown paths use this to stay
/// no-op when init never ran.
#[must_use]
pub fn try_runtime() -> Option<&'static RuntimeContext> {
    RUNTIME.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::JsonFileStore;

    // The slot is process-global, so one test exercises the whole surface.
    #[test]
    fn test_init_once_then_reject() {
        assert!(try_runtime().is_none());

        let store = Arc::new(JsonFileStore::in_memory());
        let getter: Arc<MainConfigGetter> = Arc::new(|| serde_json::json!({"sandbox": {}}));
        init_runtime(store.clone(), getter.clone()).expect("first init succeeds");

        assert!(try_runtime().is_some());
        assert!(runtime().main_config().get("sandbox").is_some());

        let err = init_runtime(store, getter).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyInitialized));
    }
}
