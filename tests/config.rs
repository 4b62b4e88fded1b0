//! Configuration resolution and drift-hash scenarios, end to end from the
//! host's JSON config shape.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::json;

use wopr_plugin_sandbox::config::{
    compute_sandbox_config_hash, resolve_sandbox_config, resolve_sandbox_scope, should_sandbox,
    PolicySource, SandboxDockerConfig, SandboxScope, TrustLevel, WorkspaceAccess,
};
use wopr_plugin_sandbox::docker::{build_sandbox_create_args, CreateArgs};

#[test]
fn scope_resolution_vectors() {
    assert_eq!(
        resolve_sandbox_scope(Some(SandboxScope::Shared), Some(true)),
        SandboxScope::Shared,
        "explicit scope wins over perSession"
    );
    assert_eq!(resolve_sandbox_scope(None, None), SandboxScope::Session);
}

#[test]
fn docker_merge_vectors() {
    let main = json!({
        "sandbox": {
            "mode": "all",
            "docker": {
                "network": "none",
                "env": {"LANG": "en_US.UTF-8", "FOO": "bar"},
                "binds": ["/h/a:/c/a"]
            }
        },
        "sessions": [{
            "name": "dev",
            "sandbox": {
                "docker": {
                    "network": "host",
                    "env": {"FOO": "baz", "EXTRA": "v"},
                    "binds": ["/h/b:/c/b"]
                }
            }
        }]
    });

    let cfg = resolve_sandbox_config("dev", None, &main);
    assert_eq!(cfg.docker.network, "host");
    assert_eq!(
        cfg.docker.env,
        BTreeMap::from([
            ("LANG".to_string(), "en_US.UTF-8".to_string()),
            ("FOO".to_string(), "baz".to_string()),
            ("EXTRA".to_string(), "v".to_string()),
        ])
    );
    assert_eq!(
        cfg.docker.binds.as_deref(),
        Some(["/h/a:/c/a".to_string(), "/h/b:/c/b".to_string()].as_slice())
    );
}

#[test]
fn hard_coded_defaults_apply_without_config() {
    let cfg = resolve_sandbox_config("dev", None, &json!({}));
    assert!(cfg.docker.read_only_root);
    assert_eq!(cfg.docker.tmpfs, vec!["/tmp", "/var/tmp", "/run"]);
    assert_eq!(cfg.docker.network, "none");
    assert_eq!(cfg.docker.cap_drop, vec!["ALL"]);
    assert_eq!(cfg.docker.pids_limit, Some(100));
    assert_eq!(cfg.docker.cpus, Some(0.5));
    assert_eq!(cfg.prune.idle_hours, 24);
    assert_eq!(cfg.prune.max_age_days, 7);
}

#[test]
fn trust_levels_override_mode_and_workspace_access() {
    let off = json!({});
    assert!(!should_sandbox("dev", None, &off));
    assert!(should_sandbox("dev", Some(TrustLevel::Untrusted), &off));

    let cfg = resolve_sandbox_config("dev", Some(TrustLevel::Untrusted), &off);
    assert_eq!(cfg.workspace_access, WorkspaceAccess::None);
    let cfg = resolve_sandbox_config("dev", Some(TrustLevel::SemiTrusted), &off);
    assert_eq!(cfg.workspace_access, WorkspaceAccess::Ro);
}

#[test]
fn non_main_mode_exempts_main_session() {
    let main = json!({"sandbox": {"mode": "non-main"}});
    assert!(!should_sandbox("main", None, &main));
    assert!(should_sandbox("build", None, &main));
}

#[test]
fn tool_policy_resolution_records_sources() {
    let main = json!({
        "sandbox": {"tools": {"allow": ["memory_*"]}},
        "sessions": [{
            "name": "dev",
            "sandbox": {"tools": {"deny": ["memory_admin"]}}
        }]
    });
    let cfg = resolve_sandbox_config("dev", None, &main);
    assert_eq!(cfg.tools.allow, vec!["memory_*"]);
    assert_eq!(cfg.tools.allow_source, PolicySource::Global);
    assert_eq!(cfg.tools.deny, vec!["memory_admin"]);
    assert_eq!(cfg.tools.deny_source, PolicySource::Session);
}

#[test]
fn hash_ignores_primitive_array_order() {
    let mut a = SandboxDockerConfig::default();
    a.cap_drop = vec!["ALL".into(), "NET_RAW".into()];
    let mut b = SandboxDockerConfig::default();
    b.cap_drop = vec!["NET_RAW".into(), "ALL".into()];

    let dir = Path::new("/ws");
    assert_eq!(
        compute_sandbox_config_hash(&a, WorkspaceAccess::Rw, dir),
        compute_sandbox_config_hash(&b, WorkspaceAccess::Rw, dir)
    );
}

#[test]
fn hash_tracks_meaningful_changes() {
    let base = SandboxDockerConfig::default();
    let dir = Path::new("/ws");
    let baseline = compute_sandbox_config_hash(&base, WorkspaceAccess::Rw, dir);

    let mut changed = base.clone();
    changed.network = "bridge".into();
    assert_ne!(
        baseline,
        compute_sandbox_config_hash(&changed, WorkspaceAccess::Rw, dir)
    );

    assert_ne!(
        baseline,
        compute_sandbox_config_hash(&base, WorkspaceAccess::Ro, dir)
    );
    assert_ne!(
        baseline,
        compute_sandbox_config_hash(&base, WorkspaceAccess::Rw, Path::new("/elsewhere"))
    );
}

#[test]
fn create_args_literal_vector() {
    let main = json!({
        "sandbox": {
            "mode": "all",
            "docker": {
                "tmpfs": ["/tmp", "/var/tmp"],
                "pidsLimit": 50,
                "memory": "256m",
                "cpus": 1.5,
                "ulimits": {"nofile": {"soft": 1024, "hard": 2048}}
            }
        }
    });
    let cfg = resolve_sandbox_config("dev", None, &main);

    let args = build_sandbox_create_args(&CreateArgs {
        name: "wopr-sbx-dev-12345678",
        cfg: &cfg.docker,
        scope_key: "dev",
        created_at_ms: Some(1_700_000_000_000),
        labels: None,
        config_hash: None,
    });

    let pair = |flag: &str, value: &str| {
        args.windows(2)
            .any(|w| w[0] == flag && w[1] == value)
    };
    assert!(args.contains(&"--read-only".to_string()));
    assert!(pair("--tmpfs", "/tmp"));
    assert!(pair("--tmpfs", "/var/tmp"));
    assert!(pair("--pids-limit", "50"));
    assert!(pair("--memory", "256m"));
    assert!(pair("--cpus", "1.5"));
    assert!(pair("--ulimit", "nofile=1024:2048"));
    assert!(pair("--security-opt", "no-new-privileges"));
}

#[test]
fn create_args_round_trip_deterministic() {
    let cfg = resolve_sandbox_config("dev", None, &json!({"sandbox": {"mode": "all"}}));
    let build = || {
        build_sandbox_create_args(&CreateArgs {
            name: "wopr-sbx-dev-12345678",
            cfg: &cfg.docker,
            scope_key: "dev",
            created_at_ms: Some(42),
            labels: None,
            config_hash: Some("deadbeef"),
        })
    };
    assert_eq!(build(), build());
}
