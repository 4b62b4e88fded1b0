//! Layered configuration resolution.
//!
//! Merge order for every field is session > global > hard-coded default,
//! with three exceptions spelled out on [`resolve_sandbox_docker_config`]:
//! env maps and ulimit maps shallow-merge instead of replacing, and bind
//! lists concatenate global-then-session.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    PolicySource, PruneConfig, PruneSettings, ResolvedToolPolicy, SandboxConfig,
    SandboxDockerConfig, SandboxDockerOverrides, SandboxMode, SandboxScope, SandboxSettings,
    SandboxToolPolicy, TrustLevel, WorkspaceAccess,
};
use crate::constants;

/// Resolves the container scope from explicit and legacy knobs.
///
/// An explicit `scope` wins; otherwise the boolean `perSession` maps `true`
/// to session scope and `false` to shared. The default is session scope.
#[must_use]
pub fn resolve_sandbox_scope(
    scope: Option<SandboxScope>,
    per_session: Option<bool>,
) -> SandboxScope {
    if let Some(scope) = scope {
        return scope;
    }
    match per_session {
        Some(true) | None => SandboxScope::Session,
        Some(false) => SandboxScope::Shared,
    }
}

/// Merges the global and per-session Docker overrides onto the defaults.
///
/// Scalar fields take the innermost configured value. `env` shallow-merges
/// the session entries over the global map (or the default `LANG` map) only
/// when the session provides any; `ulimits` behaves the same way; `binds`
/// concatenates global entries before session entries and omits the field
/// entirely when the concatenation is empty.
#[must_use]
pub fn resolve_sandbox_docker_config(
    global: Option<&SandboxDockerOverrides>,
    session: Option<&SandboxDockerOverrides>,
) -> SandboxDockerConfig {
    let defaults = SandboxDockerConfig::default();
    let none = SandboxDockerOverrides::default();
    let global = global.unwrap_or(&none);
    let session = session.unwrap_or(&none);

    fn pick<T: Clone>(session: &Option<T>, global: &Option<T>, default: T) -> T {
        session
            .clone()
            .or_else(|| global.clone())
            .unwrap_or(default)
    }

    fn pick_opt<T: Clone>(session: &Option<T>, global: &Option<T>) -> Option<T> {
        session.clone().or_else(|| global.clone())
    }

    let env = match (&session.env, &global.env) {
        (Some(session_env), global_env) => {
            let mut merged = global_env.clone().unwrap_or_else(|| defaults.env.clone());
            merged.extend(session_env.clone());
            merged
        }
        (None, Some(global_env)) => global_env.clone(),
        (None, None) => defaults.env.clone(),
    };

    let ulimits = match (&session.ulimits, &global.ulimits) {
        (Some(session_ulimits), global_ulimits) => {
            let mut merged = global_ulimits.clone().unwrap_or_default();
            merged.extend(session_ulimits.clone());
            merged
        }
        (None, Some(global_ulimits)) => global_ulimits.clone(),
        (None, None) => BTreeMap::new(),
    };

    let binds: Vec<String> = global
        .binds
        .iter()
        .flatten()
        .chain(session.binds.iter().flatten())
        .cloned()
        .collect();

    SandboxDockerConfig {
        image: pick(&session.image, &global.image, defaults.image),
        container_prefix: pick(
            &session.container_prefix,
            &global.container_prefix,
            defaults.container_prefix,
        ),
        workdir: pick(&session.workdir, &global.workdir, defaults.workdir),
        read_only_root: pick(
            &session.read_only_root,
            &global.read_only_root,
            defaults.read_only_root,
        ),
        tmpfs: pick(&session.tmpfs, &global.tmpfs, defaults.tmpfs),
        network: pick(&session.network, &global.network, defaults.network),
        user: pick_opt(&session.user, &global.user),
        cap_drop: pick(&session.cap_drop, &global.cap_drop, defaults.cap_drop),
        env,
        setup_command: pick_opt(&session.setup_command, &global.setup_command),
        pids_limit: session
            .pids_limit
            .or(global.pids_limit)
            .or(defaults.pids_limit),
        memory: pick_opt(&session.memory, &global.memory).or(defaults.memory),
        memory_swap: pick_opt(&session.memory_swap, &global.memory_swap).or(defaults.memory_swap),
        cpus: session.cpus.or(global.cpus).or(defaults.cpus),
        ulimits,
        seccomp_profile: pick_opt(&session.seccomp_profile, &global.seccomp_profile),
        apparmor_profile: pick_opt(&session.apparmor_profile, &global.apparmor_profile),
        dns: pick_opt(&session.dns, &global.dns),
        extra_hosts: pick_opt(&session.extra_hosts, &global.extra_hosts),
        binds: if binds.is_empty() { None } else { Some(binds) },
    }
}

/// Field-wise prune threshold resolution, session > global > default.
#[must_use]
pub fn resolve_sandbox_prune_config(
    global: Option<&PruneSettings>,
    session: Option<&PruneSettings>,
) -> PruneConfig {
    let defaults = PruneConfig::default();
    let pick = |field: fn(&PruneSettings) -> Option<u64>, default: u64| {
        session
            .and_then(field)
            .or_else(|| global.and_then(field))
            .unwrap_or(default)
    };
    PruneConfig {
        idle_hours: pick(|p| p.idle_hours, defaults.idle_hours),
        max_age_days: pick(|p| p.max_age_days, defaults.max_age_days),
    }
}

/// Resolves allow and deny lists independently: a session-provided list wins
/// outright, then the global list, then the built-in defaults. The chosen
/// source is recorded per list for diagnostics.
#[must_use]
pub fn resolve_tool_policy(
    global: Option<&SandboxToolPolicy>,
    session: Option<&SandboxToolPolicy>,
) -> ResolvedToolPolicy {
    fn pick(
        session: Option<&Vec<String>>,
        global: Option<&Vec<String>>,
        default: &[&str],
    ) -> (Vec<String>, PolicySource) {
        if let Some(list) = session {
            (list.clone(), PolicySource::Session)
        } else if let Some(list) = global {
            (list.clone(), PolicySource::Global)
        } else {
            (
                default.iter().map(ToString::to_string).collect(),
                PolicySource::Default,
            )
        }
    }

    let (allow, allow_source) = pick(
        session.and_then(|p| p.allow.as_ref()),
        global.and_then(|p| p.allow.as_ref()),
        constants::DEFAULT_TOOL_ALLOW,
    );
    let (deny, deny_source) = pick(
        session.and_then(|p| p.deny.as_ref()),
        global.and_then(|p| p.deny.as_ref()),
        constants::DEFAULT_TOOL_DENY,
    );

    ResolvedToolPolicy {
        allow,
        deny,
        allow_source,
        deny_source,
    }
}

/// Extracts the global and per-session sandbox settings from the host's
/// merged configuration object.
///
/// The host config is opaque JSON; `sandbox` and `sessions[].sandbox` are
/// read leniently, with malformed sections degrading to empty settings
/// rather than failing resolution.
#[must_use]
pub fn sandbox_settings_for_session(
    main_config: &Value,
    session_name: &str,
) -> (SandboxSettings, SandboxSettings) {
    fn parse_settings(value: Option<&Value>) -> SandboxSettings {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    let global = parse_settings(main_config.get("sandbox"));

    let session_block = main_config
        .get("sessions")
        .and_then(Value::as_array)
        .and_then(|sessions| {
            sessions.iter().find(|entry| {
                entry.get("name").and_then(Value::as_str) == Some(session_name)
            })
        })
        .and_then(|entry| entry.get("sandbox"));
    let session = parse_settings(session_block);

    (global, session)
}

fn effective_mode(global: &SandboxSettings, trust_level: Option<TrustLevel>) -> SandboxMode {
    match trust_level {
        Some(TrustLevel::Untrusted) | Some(TrustLevel::SemiTrusted) => SandboxMode::All,
        _ => global.mode.unwrap_or_default(),
    }
}

/// Whether the named session should run sandboxed.
///
/// `off` never sandboxes, `all` always does, and `non-main` sandboxes every
/// session except `"main"`. An untrusted or semi-trusted session is always
/// sandboxed regardless of the configured mode.
#[must_use]
pub fn should_sandbox(
    session_name: &str,
    trust_level: Option<TrustLevel>,
    main_config: &Value,
) -> bool {
    let (global, _) = sandbox_settings_for_session(main_config, session_name);
    match effective_mode(&global, trust_level) {
        SandboxMode::Off => false,
        SandboxMode::All => true,
        SandboxMode::NonMain => session_name != constants::MAIN_SESSION_NAME,
    }
}

/// Produces the full effective sandbox configuration for a session.
///
/// Trust levels override the configured posture: untrusted and semi-trusted
/// sessions force `mode=all`, and their workspace access is clamped to
/// `none` and `ro` respectively.
#[must_use]
pub fn resolve_sandbox_config(
    session_name: &str,
    trust_level: Option<TrustLevel>,
    main_config: &Value,
) -> SandboxConfig {
    let (global, session) = sandbox_settings_for_session(main_config, session_name);

    let mode = effective_mode(&global, trust_level);

    let scope = resolve_sandbox_scope(
        session.scope.or(global.scope),
        session.per_session.or(global.per_session),
    );

    let workspace_access = match trust_level {
        Some(TrustLevel::Untrusted) => WorkspaceAccess::None,
        Some(TrustLevel::SemiTrusted) => WorkspaceAccess::Ro,
        _ => session
            .workspace_access
            .or(global.workspace_access)
            .unwrap_or_default(),
    };

    let workspace_root = session
        .workspace_root
        .clone()
        .or_else(|| global.workspace_root.clone())
        .unwrap_or_else(constants::default_workspace_root);

    SandboxConfig {
        mode,
        scope,
        workspace_access,
        workspace_root,
        docker: resolve_sandbox_docker_config(global.docker.as_ref(), session.docker.as_ref()),
        tools: resolve_tool_policy(global.tools.as_ref(), session.tools.as_ref()),
        prune: resolve_sandbox_prune_config(global.prune.as_ref(), session.prune.as_ref()),
    }
}
