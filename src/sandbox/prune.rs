//! Idle- and age-based container reclamation.
//!
//! Prune passes walk the registry, not the Docker daemon: every container
//! this plugin has ever observed has a record, and eviction removes the
//! record even when `docker rm` fails, so a half-dead daemon cannot wedge
//! the registry. Passes are debounced process-wide to one per five-minute
//! window.

use std::sync::atomic::{AtomicI64, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::config::PruneConfig;
use crate::constants::PRUNE_DEBOUNCE_MS;
use crate::docker::{docker_container_state, exec_docker};
use crate::error::Result;
use crate::registry::{
    list_registry_entries, remove_registry_entry, RegistryStore, SandboxRegistryRecord,
};

static LAST_PRUNE_AT_MS: AtomicI64 = AtomicI64::new(0);

/// Runs a prune pass unless one ran within the debounce window. Failures
/// are logged and swallowed; the debounce timestamp advances either way.
/// Returns whether a pass actually ran.
pub async fn maybe_prune(store: &dyn RegistryStore, cfg: &PruneConfig) -> bool {
    let now = chrono::Utc::now().timestamp_millis();
    let last = LAST_PRUNE_AT_MS.load(Ordering::Relaxed);
    if now - last < PRUNE_DEBOUNCE_MS {
        return false;
    }
    LAST_PRUNE_AT_MS.store(now, Ordering::Relaxed);

    if let Err(e) = prune(store, cfg).await {
        warn!(error = %e, "sandbox prune failed");
    }
    true
}

/// Evicts every registered container past the idle or age threshold.
/// Thresholds of zero disable their check; with both at zero the pass is a
/// no-op. Returns the number of containers evicted.
///
/// # Errors
///
/// Fails only when the registry cannot be listed; per-container eviction
/// problems are logged and skipped.
#[instrument(skip(store, cfg), fields(idle_hours = cfg.idle_hours, max_age_days = cfg.max_age_days))]
pub async fn prune(store: &dyn RegistryStore, cfg: &PruneConfig) -> Result<usize> {
    if cfg.idle_hours == 0 && cfg.max_age_days == 0 {
        debug!("pruning disabled by config");
        return Ok(0);
    }

    let now = chrono::Utc::now().timestamp_millis();
    let idle_limit_ms = cfg.idle_hours as i64 * 3_600_000;
    let age_limit_ms = cfg.max_age_days as i64 * 86_400_000;

    let mut removed = 0usize;
    for record in list_registry_entries(store).await? {
        let idle_ms = now - record.last_used_at_ms;
        let age_ms = now - record.created_at_ms;
        let idle_hit = cfg.idle_hours > 0 && idle_ms > idle_limit_ms;
        let age_hit = cfg.max_age_days > 0 && age_ms > age_limit_ms;
        if idle_hit || age_hit {
            debug!(
                container = %record.container_name,
                idle_ms,
                age_ms,
                "evicting sandbox container"
            );
            evict(store, &record).await;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, "pruned sandbox containers");
    }
    Ok(removed)
}

/// Tears down every known container regardless of thresholds. Used at
/// plugin shutdown. Returns the number of containers removed.
///
/// # Errors
///
/// Fails only when the registry cannot be listed.
#[instrument(skip(store))]
pub async fn prune_all(store: &dyn RegistryStore) -> Result<usize> {
    let records = list_registry_entries(store).await?;
    let count = records.len();
    for record in &records {
        evict(store, record).await;
    }
    if count > 0 {
        info!(count, "removed all sandbox containers");
    }
    Ok(count)
}

/// Best-effort removal of one container plus its registry record. The
/// record goes away even when Docker refuses, so a container deleted out
/// of band self-heals out of the registry.
async fn evict(store: &dyn RegistryStore, record: &SandboxRegistryRecord) {
    let _ = exec_docker(
        &[
            "rm".to_string(),
            "-f".to_string(),
            record.container_name.clone(),
        ],
        true,
    )
    .await;
    if let Err(e) = remove_registry_entry(store, &record.container_name).await {
        warn!(
            container = %record.container_name,
            error = %e,
            "failed to remove registry entry"
        );
    }
}

/// Starts a registered container that exists but is stopped. Absent
/// containers are left alone.
///
/// # Errors
///
/// Fails when the start command fails.
pub async fn ensure_container_running(name: &str) -> Result<()> {
    let state = docker_container_state(name).await?;
    if state.exists && !state.running {
        debug!(container = name, "starting stopped container");
        exec_docker(&["start".to_string(), name.to_string()], false).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{update_registry_entry, JsonFileStore, RegistryUpdate};

    fn touch(name: &str, now_ms: i64) -> RegistryUpdate {
        RegistryUpdate {
            container_name: name.to_string(),
            session_key: "dev".to_string(),
            now_ms,
            image: "img".to_string(),
            config_hash: None,
        }
    }

    /// Inserts a record created at `created` and last used at `last_used`
    /// by writing twice; the second write only moves `last_used_at_ms`.
    async fn seed(store: &JsonFileStore, name: &str, created: i64, last_used: i64) {
        update_registry_entry(store, touch(name, created)).await.unwrap();
        if last_used != created {
            update_registry_entry(store, touch(name, last_used)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_prune_disabled_when_both_thresholds_zero() {
        let store = JsonFileStore::in_memory();
        seed(&store, "old", 0, 0).await;
        let cfg = PruneConfig {
            idle_hours: 0,
            max_age_days: 0,
        };
        assert_eq!(prune(&store, &cfg).await.unwrap(), 0);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_evicts_idle_and_aged() {
        let store = JsonFileStore::in_memory();
        let now = chrono::Utc::now().timestamp_millis();

        // Fresh container: survives.
        seed(&store, "fresh", now, now).await;
        // Idle for two days with 24h idle threshold: evicted.
        seed(&store, "idle", now, now - 2 * 86_400_000).await;
        // Created ten days ago but recently used, 7 day age cap: evicted.
        seed(&store, "aged", now - 10 * 86_400_000, now).await;

        let cfg = PruneConfig {
            idle_hours: 24,
            max_age_days: 7,
        };
        let removed = prune(&store, &cfg).await.unwrap();
        assert_eq!(removed, 2);

        let left: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.container_name)
            .collect();
        assert_eq!(left, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_prune_idle_only_ignores_age() {
        let store = JsonFileStore::in_memory();
        let now = chrono::Utc::now().timestamp_millis();
        seed(&store, "aged-but-active", now - 30 * 86_400_000, now).await;

        let cfg = PruneConfig {
            idle_hours: 24,
            max_age_days: 0,
        };
        assert_eq!(prune(&store, &cfg).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_all_clears_registry() {
        let store = JsonFileStore::in_memory();
        let now = chrono::Utc::now().timestamp_millis();
        seed(&store, "a", now, now).await;
        seed(&store, "b", now, now).await;

        assert_eq!(prune_all(&store).await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_maybe_prune_debounces() {
        let store = JsonFileStore::in_memory();
        let cfg = PruneConfig {
            idle_hours: 24,
            max_age_days: 7,
        };
        let first = maybe_prune(&store, &cfg).await;
        let second = maybe_prune(&store, &cfg).await;
        assert!(first, "first call runs a pass");
        assert!(!second, "second call within the window is debounced");
    }
}
