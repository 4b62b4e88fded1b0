//! Defaults and well-known names shared across the plugin.

use std::path::PathBuf;

/// Image used when no image is configured. Built lazily by tagging the
/// Debian base image, see `docker::ensure_docker_image`.
pub const DEFAULT_SANDBOX_IMAGE: &str = "wopr-sandbox:latest";

/// Base image pulled and tagged as [`DEFAULT_SANDBOX_IMAGE`] when it is
/// missing locally.
pub const SANDBOX_BASE_IMAGE: &str = "debian:bookworm-slim";

/// Prefix for sandbox container names.
pub const DEFAULT_CONTAINER_PREFIX: &str = "wopr-sbx-";

/// Working directory inside sandbox containers; the workspace is bind
/// mounted here.
pub const DEFAULT_CONTAINER_WORKDIR: &str = "/workspace";

/// Docker rejects container names longer than this.
pub const CONTAINER_NAME_MAX_LEN: usize = 63;

/// Containers idle longer than this many hours are pruned (0 disables).
pub const DEFAULT_IDLE_HOURS: u64 = 24;

/// Containers older than this many days are pruned (0 disables).
pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

/// Minimum wall-clock gap between two prune passes.
pub const PRUNE_DEBOUNCE_MS: i64 = 5 * 60 * 1000;

/// A running container whose registry record was touched within this window
/// is never recreated on config drift.
pub const HOT_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Default tool allow list: everything not denied.
pub const DEFAULT_TOOL_ALLOW: &[&str] = &["*"];

/// Default tool deny list: host-reaching and administrative tools stay out
/// of sandboxed sessions.
pub const DEFAULT_TOOL_DENY: &[&str] = &["host_*", "admin_*"];

/// Marker label present on every container this plugin creates.
pub const LABEL_SANDBOX: &str = "wopr.sandbox";
/// Label carrying the scope key the container belongs to.
pub const LABEL_SESSION_KEY: &str = "wopr.sessionKey";
/// Label carrying the creation time in epoch milliseconds.
pub const LABEL_CREATED_AT_MS: &str = "wopr.createdAtMs";
/// Label carrying the effective config hash at creation time.
pub const LABEL_CONFIG_HASH: &str = "wopr.configHash";

/// Scope key used by every session when the sandbox scope is `shared`.
pub const SHARED_SCOPE_KEY: &str = "shared";

/// Session name treated as the trusted main session by `non-main` mode, and
/// the scope-key fallback for blank session names.
pub const MAIN_SESSION_NAME: &str = "main";

/// Base directory for plugin state.
///
/// Uses `$WOPR_HOME` if set, otherwise `$HOME/.wopr`, with a `/tmp` last
/// resort for degenerate environments.
#[must_use]
pub fn wopr_state_dir() -> PathBuf {
    if let Ok(home) = std::env::var("WOPR_HOME") {
        return PathBuf::from(home);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".wopr");
    }
    PathBuf::from("/tmp/.wopr")
}

/// Default root under which per-session workspace directories are created.
#[must_use]
pub fn default_workspace_root() -> PathBuf {
    wopr_state_dir().join("sandboxes")
}

/// Location of the legacy JSON registry imported once at plugin init.
#[must_use]
pub fn legacy_registry_path() -> PathBuf {
    wopr_state_dir().join("sandbox").join("containers.json")
}
