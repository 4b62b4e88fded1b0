//! Sandbox configuration model.
//!
//! Configuration arrives in three layers: hard-coded defaults, the host's
//! global `sandbox` section, and an optional per-session override block.
//! The partial types here (`SandboxSettings`, `SandboxDockerOverrides`)
//! model the two outer layers with every field optional; the full types
//! (`SandboxConfig`, [`SandboxDockerConfig`]) are what the resolver in
//! [`resolve`] produces. Precedence is always session > global > default,
//! field by field; see the resolver for the exact merge rules.

mod hash;
mod resolve;

pub use hash::compute_sandbox_config_hash;
pub use resolve::{
    resolve_sandbox_config, resolve_sandbox_docker_config, resolve_sandbox_prune_config,
    resolve_sandbox_scope, resolve_tool_policy, sandbox_settings_for_session, should_sandbox,
};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants;

/// When sandboxing applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// Never sandbox.
    #[default]
    Off,
    /// Sandbox every session except the main one.
    #[serde(alias = "nonmain")]
    NonMain,
    /// Sandbox every session.
    All,
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::NonMain => f.write_str("non-main"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Container lifecycle boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxScope {
    /// One container per session.
    #[default]
    Session,
    /// One container shared by every session on this node.
    Shared,
}

impl fmt::Display for SandboxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Shared => f.write_str("shared"),
        }
    }
}

/// How the per-session host workspace is mounted into the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceAccess {
    /// No mount.
    #[default]
    None,
    /// Read-only bind mount.
    Ro,
    /// Read-write bind mount.
    Rw,
}

impl fmt::Display for WorkspaceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Ro => f.write_str("ro"),
            Self::Rw => f.write_str("rw"),
        }
    }
}

/// Trust classification of the session requesting a sandbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustLevel {
    /// Fully untrusted: sandboxing forced, no workspace access.
    Untrusted,
    /// Semi-trusted: sandboxing forced, read-only workspace.
    SemiTrusted,
    /// Trusted: host configuration decides.
    #[default]
    Trusted,
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untrusted" => Ok(Self::Untrusted),
            "semi-trusted" | "semitrusted" => Ok(Self::SemiTrusted),
            "trusted" => Ok(Self::Trusted),
            other => Err(format!(
                "unknown trust level {other:?} (expected untrusted, semi-trusted or trusted)"
            )),
        }
    }
}

/// A Docker size value: either a byte count or a size literal like `"512m"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    /// Plain byte count; stringified when emitted as a flag value.
    Number(u64),
    /// Docker size literal, passed through after trimming.
    Literal(String),
}

impl SizeSpec {
    /// Flag value for `--memory`-style options. Blank literals yield `None`
    /// and the flag is omitted.
    #[must_use]
    pub fn as_flag_value(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Literal(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

impl From<&str> for SizeSpec {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

/// Soft/hard bounds for a ulimit entry. Either side may be omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlimitRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard: Option<i64>,
}

/// A ulimit value: a single number applied to both bounds, or a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UlimitSpec {
    Value(i64),
    Range(UlimitRange),
}

impl UlimitSpec {
    /// `--ulimit` flag value (`soft:hard`, `soft`, or a single number).
    /// Negative values clamp to 0; a range with neither side yields `None`.
    #[must_use]
    pub fn as_flag_value(&self) -> Option<String> {
        fn clamp(v: i64) -> i64 {
            v.max(0)
        }
        match self {
            Self::Value(v) => Some(clamp(*v).to_string()),
            Self::Range(UlimitRange { soft, hard }) => match (soft, hard) {
                (Some(s), Some(h)) => Some(format!("{}:{}", clamp(*s), clamp(*h))),
                (Some(s), None) => Some(clamp(*s).to_string()),
                (None, Some(h)) => Some(clamp(*h).to_string()),
                (None, None) => None,
            },
        }
    }
}

/// The post-merge container blueprint handed to the Docker driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxDockerConfig {
    /// Container image reference.
    pub image: String,
    /// Prefix for container names.
    pub container_prefix: String,
    /// Working directory inside the container; also the workspace mount
    /// target.
    pub workdir: String,
    /// Mount the root filesystem read-only.
    pub read_only_root: bool,
    /// tmpfs mount targets.
    pub tmpfs: Vec<String>,
    /// Docker network mode (`none`, `bridge`, `host`, or a named network).
    pub network: String,
    /// `uid:gid` or user name to run as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Linux capabilities to drop.
    pub cap_drop: Vec<String>,
    /// Environment variables passed at create time.
    pub env: BTreeMap<String, String>,
    /// Single shell command run once after create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_command: Option<String>,
    /// PID cap; zero or absent means unlimited (flag omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<u32>,
    /// Memory limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<SizeSpec>,
    /// Memory+swap limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<SizeSpec>,
    /// CPU quota in cores; emitted only when positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Resource limits by ulimit name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ulimits: BTreeMap<String, UlimitSpec>,
    /// Path to a seccomp profile on the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp_profile: Option<String>,
    /// AppArmor profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
    /// DNS servers; blank entries are skipped after trimming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
    /// `host:ip` entries for `--add-host`; blanks skipped after trimming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_hosts: Option<Vec<String>>,
    /// Extra bind mounts, `HOST:CTR[:MODE]`, global entries first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binds: Option<Vec<String>>,
}

impl Default for SandboxDockerConfig {
    fn default() -> Self {
        Self {
            image: constants::DEFAULT_SANDBOX_IMAGE.to_string(),
            container_prefix: constants::DEFAULT_CONTAINER_PREFIX.to_string(),
            workdir: constants::DEFAULT_CONTAINER_WORKDIR.to_string(),
            read_only_root: true,
            tmpfs: vec![
                "/tmp".to_string(),
                "/var/tmp".to_string(),
                "/run".to_string(),
            ],
            network: "none".to_string(),
            user: None,
            cap_drop: vec!["ALL".to_string()],
            env: BTreeMap::from([("LANG".to_string(), "C.UTF-8".to_string())]),
            setup_command: None,
            pids_limit: Some(100),
            memory: Some(SizeSpec::from("512m")),
            memory_swap: Some(SizeSpec::from("512m")),
            cpus: Some(0.5),
            ulimits: BTreeMap::new(),
            seccomp_profile: None,
            apparmor_profile: None,
            dns: None,
            extra_hosts: None,
            binds: None,
        }
    }
}

/// Partial Docker settings from one configuration layer. Every field is
/// optional; unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxDockerOverrides {
    pub image: Option<String>,
    pub container_prefix: Option<String>,
    pub workdir: Option<String>,
    pub read_only_root: Option<bool>,
    pub tmpfs: Option<Vec<String>>,
    pub network: Option<String>,
    pub user: Option<String>,
    pub cap_drop: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub setup_command: Option<String>,
    pub pids_limit: Option<u32>,
    pub memory: Option<SizeSpec>,
    pub memory_swap: Option<SizeSpec>,
    pub cpus: Option<f64>,
    pub ulimits: Option<BTreeMap<String, UlimitSpec>>,
    pub seccomp_profile: Option<String>,
    pub apparmor_profile: Option<String>,
    pub dns: Option<Vec<String>>,
    pub extra_hosts: Option<Vec<String>>,
    pub binds: Option<Vec<String>>,
}

/// Raw allow/deny tool lists as configured.
///
/// Empty or absent `allow` means "allow everything not denied"; deny always
/// wins. Malformed (non-array) values deserialize as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SandboxToolPolicy {
    #[serde(deserialize_with = "lenient_string_list")]
    pub allow: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub deny: Option<Vec<String>>,
}

/// Accepts an array of strings; anything else (including arrays with
/// non-string members, which are dropped member-wise) degrades gracefully
/// instead of failing the whole config parse.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

/// Where a resolved tool list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicySource {
    Session,
    Global,
    Default,
}

impl PolicySource {
    /// Diagnostic key path for config-backed sources; built-in defaults have
    /// no path.
    #[must_use]
    pub fn key_path(&self, field: &str) -> Option<String> {
        match self {
            Self::Session => Some(format!("sessions[].sandbox.tools.{field}")),
            Self::Global => Some(format!("sandbox.tools.{field}")),
            Self::Default => None,
        }
    }
}

/// Tool policy after layer resolution, with provenance for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub allow_source: PolicySource,
    pub deny_source: PolicySource,
}

/// Partial prune thresholds from one configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PruneSettings {
    pub idle_hours: Option<u64>,
    pub max_age_days: Option<u64>,
}

/// Effective prune thresholds. Zero disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneConfig {
    pub idle_hours: u64,
    pub max_age_days: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            idle_hours: constants::DEFAULT_IDLE_HOURS,
            max_age_days: constants::DEFAULT_MAX_AGE_DAYS,
        }
    }
}

/// One layer of sandbox settings as it appears in the host configuration,
/// either at `sandbox` (global) or `sessions[].sandbox` (per session).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxSettings {
    pub mode: Option<SandboxMode>,
    pub scope: Option<SandboxScope>,
    pub per_session: Option<bool>,
    pub workspace_access: Option<WorkspaceAccess>,
    pub workspace_root: Option<PathBuf>,
    pub docker: Option<SandboxDockerOverrides>,
    pub tools: Option<SandboxToolPolicy>,
    pub prune: Option<PruneSettings>,
}

/// The fully resolved sandbox configuration for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    pub scope: SandboxScope,
    pub workspace_access: WorkspaceAccess,
    pub workspace_root: PathBuf,
    pub docker: SandboxDockerConfig,
    pub tools: ResolvedToolPolicy,
    pub prune: PruneConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde_forms() {
        assert_eq!(
            serde_json::from_str::<SandboxMode>("\"non-main\"").unwrap(),
            SandboxMode::NonMain
        );
        assert_eq!(
            serde_json::from_str::<SandboxMode>("\"nonmain\"").unwrap(),
            SandboxMode::NonMain
        );
        assert_eq!(serde_json::to_string(&SandboxMode::NonMain).unwrap(), "\"non-main\"");
    }

    #[test]
    fn test_trust_level_from_str() {
        assert_eq!("untrusted".parse::<TrustLevel>().unwrap(), TrustLevel::Untrusted);
        assert_eq!(
            "semi-trusted".parse::<TrustLevel>().unwrap(),
            TrustLevel::SemiTrusted
        );
        assert!("root".parse::<TrustLevel>().is_err());
    }

    #[test]
    fn test_size_spec_flag_values() {
        assert_eq!(SizeSpec::Number(256).as_flag_value().as_deref(), Some("256"));
        assert_eq!(
            SizeSpec::Literal("  512m ".into()).as_flag_value().as_deref(),
            Some("512m")
        );
        assert_eq!(SizeSpec::Literal("   ".into()).as_flag_value(), None);
    }

    #[test]
    fn test_ulimit_flag_values() {
        assert_eq!(UlimitSpec::Value(1024).as_flag_value().as_deref(), Some("1024"));
        assert_eq!(UlimitSpec::Value(-3).as_flag_value().as_deref(), Some("0"));
        let range = |soft, hard| UlimitSpec::Range(UlimitRange { soft, hard });
        assert_eq!(
            range(Some(1024), Some(2048)).as_flag_value().as_deref(),
            Some("1024:2048")
        );
        assert_eq!(range(Some(64), None).as_flag_value().as_deref(), Some("64"));
        assert_eq!(range(None, Some(128)).as_flag_value().as_deref(), Some("128"));
        assert_eq!(range(None, None).as_flag_value(), None);
        assert_eq!(
            range(Some(-1), Some(10)).as_flag_value().as_deref(),
            Some("0:10")
        );
    }

    #[test]
    fn test_ulimit_spec_deserialize_forms() {
        let spec: UlimitSpec = serde_json::from_str("4096").unwrap();
        assert_eq!(spec, UlimitSpec::Value(4096));
        let spec: UlimitSpec = serde_json::from_str("{\"soft\":1,\"hard\":2}").unwrap();
        assert_eq!(
            spec,
            UlimitSpec::Range(UlimitRange {
                soft: Some(1),
                hard: Some(2)
            })
        );
    }

    #[test]
    fn test_docker_config_defaults() {
        let cfg = SandboxDockerConfig::default();
        assert!(cfg.read_only_root);
        assert_eq!(cfg.network, "none");
        assert_eq!(cfg.tmpfs, vec!["/tmp", "/var/tmp", "/run"]);
        assert_eq!(cfg.cap_drop, vec!["ALL"]);
        assert_eq!(cfg.pids_limit, Some(100));
        assert_eq!(cfg.env.get("LANG").map(String::as_str), Some("C.UTF-8"));
        assert_eq!(cfg.cpus, Some(0.5));
    }

    #[test]
    fn test_tool_policy_lenient_parse() {
        let policy: SandboxToolPolicy =
            serde_json::from_str(r#"{"allow":["a","b"],"deny":"oops"}"#).unwrap();
        assert_eq!(policy.allow.as_deref(), Some(["a".to_string(), "b".to_string()].as_slice()));
        assert!(policy.deny.is_none());

        let policy: SandboxToolPolicy = serde_json::from_str(r#"{"allow":[1,"x"]}"#).unwrap();
        assert_eq!(policy.allow.as_deref(), Some(["x".to_string()].as_slice()));
    }

    #[test]
    fn test_docker_overrides_parse_camel_case() {
        let raw = r#"{"containerPrefix":"p-","readOnlyRoot":false,"pidsLimit":50}"#;
        let overrides: SandboxDockerOverrides = serde_json::from_str(raw).unwrap();
        assert_eq!(overrides.container_prefix.as_deref(), Some("p-"));
        assert_eq!(overrides.read_only_root, Some(false));
        assert_eq!(overrides.pids_limit, Some(50));
    }

    #[test]
    fn test_policy_source_key_paths() {
        assert_eq!(
            PolicySource::Session.key_path("allow").as_deref(),
            Some("sessions[].sandbox.tools.allow")
        );
        assert_eq!(
            PolicySource::Global.key_path("deny").as_deref(),
            Some("sandbox.tools.deny")
        );
        assert_eq!(PolicySource::Default.key_path("allow"), None);
    }
}
