//! `docker create` argument assembly.
//!
//! The builder is deterministic: the same inputs always produce the same
//! argument vector, which keeps created containers reproducible and makes
//! the vector itself testable without a Docker daemon.

use std::collections::BTreeMap;

use crate::config::SandboxDockerConfig;
use crate::constants::{
    LABEL_CONFIG_HASH, LABEL_CREATED_AT_MS, LABEL_SANDBOX, LABEL_SESSION_KEY,
};

/// Inputs for one create-argument build.
#[derive(Debug, Clone)]
pub struct CreateArgs<'a> {
    /// Container name.
    pub name: &'a str,
    /// Effective Docker blueprint.
    pub cfg: &'a SandboxDockerConfig,
    /// Scope key recorded in the session-key label.
    pub scope_key: &'a str,
    /// Creation timestamp label; defaults to now.
    pub created_at_ms: Option<i64>,
    /// Additional labels; entries with a blank key or value are skipped.
    pub labels: Option<&'a BTreeMap<String, String>>,
    /// Config hash label; omitted when absent.
    pub config_hash: Option<&'a str>,
}

/// Builds the argument vector for `docker create`, excluding the trailing
/// image and command (the caller appends workdir, workspace mount, image
/// and `sleep infinity`).
#[must_use]
pub fn build_sandbox_create_args(params: &CreateArgs<'_>) -> Vec<String> {
    let cfg = params.cfg;
    let mut args: Vec<String> = vec![
        "create".into(),
        "--name".into(),
        params.name.to_string(),
    ];

    let created_at = params
        .created_at_ms
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let mut push_label = |label: String| {
        args.push("--label".into());
        args.push(label);
    };
    push_label(format!("{LABEL_SANDBOX}=1"));
    push_label(format!("{LABEL_SESSION_KEY}={}", params.scope_key));
    push_label(format!("{LABEL_CREATED_AT_MS}={created_at}"));
    if let Some(hash) = params.config_hash {
        push_label(format!("{LABEL_CONFIG_HASH}={hash}"));
    }
    if let Some(labels) = params.labels {
        for (key, value) in labels {
            if key.trim().is_empty() || value.trim().is_empty() {
                continue;
            }
            push_label(format!("{key}={value}"));
        }
    }

    if cfg.read_only_root {
        args.push("--read-only".into());
    }

    for entry in &cfg.tmpfs {
        args.push("--tmpfs".into());
        args.push(entry.clone());
    }

    if !cfg.network.is_empty() {
        args.push("--network".into());
        args.push(cfg.network.clone());
    }

    if let Some(user) = &cfg.user {
        args.push("--user".into());
        args.push(user.clone());
    }

    for cap in &cfg.cap_drop {
        args.push("--cap-drop".into());
        args.push(cap.clone());
    }

    args.push("--security-opt".into());
    args.push("no-new-privileges".into());

    if let Some(profile) = &cfg.seccomp_profile {
        args.push("--security-opt".into());
        args.push(format!("seccomp={profile}"));
    }
    if let Some(profile) = &cfg.apparmor_profile {
        args.push("--security-opt".into());
        args.push(format!("apparmor={profile}"));
    }

    for entry in cfg.dns.iter().flatten() {
        let trimmed = entry.trim();
        if !trimmed.is_empty() {
            args.push("--dns".into());
            args.push(trimmed.to_string());
        }
    }

    for entry in cfg.extra_hosts.iter().flatten() {
        let trimmed = entry.trim();
        if !trimmed.is_empty() {
            args.push("--add-host".into());
            args.push(trimmed.to_string());
        }
    }

    for (key, value) in &cfg.env {
        args.push("-e".into());
        args.push(format!("{key}={value}"));
    }

    if let Some(pids) = cfg.pids_limit {
        if pids > 0 {
            args.push("--pids-limit".into());
            args.push(pids.to_string());
        }
    }

    if let Some(value) = cfg.memory.as_ref().and_then(|m| m.as_flag_value()) {
        args.push("--memory".into());
        args.push(value);
    }
    if let Some(value) = cfg.memory_swap.as_ref().and_then(|m| m.as_flag_value()) {
        args.push("--memory-swap".into());
        args.push(value);
    }

    if let Some(cpus) = cfg.cpus {
        if cpus > 0.0 && cpus.is_finite() {
            args.push("--cpus".into());
            args.push(cpus.to_string());
        }
    }

    for (name, spec) in &cfg.ulimits {
        if name.trim().is_empty() {
            continue;
        }
        if let Some(value) = spec.as_flag_value() {
            args.push("--ulimit".into());
            args.push(format!("{name}={value}"));
        }
    }

    for bind in cfg.binds.iter().flatten() {
        args.push("-v".into());
        args.push(bind.clone());
    }

    args
}
