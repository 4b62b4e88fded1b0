//! Canonical config fingerprint for drift detection.
//!
//! The hash covers the effective Docker config, the workspace access mode
//! and the workspace directory. The serialized form is canonical so that
//! semantically equal configs hash identically across runs and platforms:
//! object keys are emitted sorted, arrays of primitives are sorted (their
//! order carries no meaning), arrays of objects keep their order, and
//! absent/null fields are dropped entirely.

use std::cmp::Ordering;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{SandboxDockerConfig, WorkspaceAccess};

/// Computes the 64-hex-char SHA-256 fingerprint of the effective sandbox
/// configuration. Stored as a container label and a registry field; any
/// difference between two fingerprints is treated as config drift.
#[must_use]
pub fn compute_sandbox_config_hash(
    docker: &SandboxDockerConfig,
    workspace_access: WorkspaceAccess,
    workspace_dir: &Path,
) -> String {
    let raw = serde_json::json!({
        "docker": docker,
        "workspaceAccess": workspace_access,
        "workspaceDir": workspace_dir,
    });
    let canonical = canonicalize(raw);
    // Value serialization cannot fail: no non-string keys, no non-finite
    // floats survive canonicalization of a config built from typed fields.
    #[allow(clippy::expect_used)]
    let bytes = serde_json::to_string(&canonical).expect("canonical JSON serializes");
    format!("{:x}", Sha256::digest(bytes.as_bytes()))
}

/// Rewrites a JSON value into its canonical form.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect(),
        ),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.into_iter().map(canonicalize).collect();
            if items.iter().all(is_primitive) {
                items.sort_by(compare_primitives);
            }
            Value::Array(items)
        }
        other => other,
    }
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

/// Total order over primitive JSON values: by type rank, then by value.
fn compare_primitives(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeSpec;
    use std::path::PathBuf;

    fn hash(cfg: &SandboxDockerConfig) -> String {
        compute_sandbox_config_hash(cfg, WorkspaceAccess::Rw, &PathBuf::from("/ws"))
    }

    #[test]
    fn test_hash_shape() {
        let h = hash(&SandboxDockerConfig::default());
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_is_stable() {
        let cfg = SandboxDockerConfig::default();
        assert_eq!(hash(&cfg), hash(&cfg));
    }

    #[test]
    fn test_hash_primitive_array_order_independent() {
        let mut a = SandboxDockerConfig::default();
        a.cap_drop = vec!["ALL".into(), "NET_RAW".into()];
        let mut b = SandboxDockerConfig::default();
        b.cap_drop = vec!["NET_RAW".into(), "ALL".into()];
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_hash_absent_fields_do_not_contribute() {
        let mut a = SandboxDockerConfig::default();
        a.user = None;
        let b = a.clone();
        assert_eq!(hash(&a), hash(&b));

        let mut c = a.clone();
        c.user = Some("1000:1000".into());
        assert_ne!(hash(&a), hash(&c));
    }

    #[test]
    fn test_hash_sensitive_to_env_values() {
        let a = SandboxDockerConfig::default();
        let mut b = a.clone();
        b.env.insert("LANG".into(), "C".into());
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_hash_sensitive_to_workspace_inputs() {
        let cfg = SandboxDockerConfig::default();
        let rw = compute_sandbox_config_hash(&cfg, WorkspaceAccess::Rw, Path::new("/ws"));
        let ro = compute_sandbox_config_hash(&cfg, WorkspaceAccess::Ro, Path::new("/ws"));
        let other = compute_sandbox_config_hash(&cfg, WorkspaceAccess::Rw, Path::new("/other"));
        assert_ne!(rw, ro);
        assert_ne!(rw, other);
    }

    #[test]
    fn test_hash_sensitive_to_binds() {
        let mut a = SandboxDockerConfig::default();
        a.binds = Some(vec!["/h/a:/c/a".into()]);
        let mut b = SandboxDockerConfig::default();
        b.binds = Some(vec!["/h/b:/c/b".into()]);
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_hash_sensitive_to_memory() {
        let mut a = SandboxDockerConfig::default();
        a.memory = Some(SizeSpec::from("256m"));
        let b = SandboxDockerConfig::default();
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_canonicalize_sorts_numbers_numerically() {
        let value = serde_json::json!([10, 2, 1]);
        let canonical = canonicalize(value);
        assert_eq!(canonical, serde_json::json!([1, 2, 10]));
    }

    #[test]
    fn test_canonicalize_keeps_object_array_order() {
        let value = serde_json::json!([{"b": 1}, {"a": 2}]);
        let canonical = canonicalize(value);
        assert_eq!(canonical, serde_json::json!([{"b": 1}, {"a": 2}]));
    }

    #[test]
    fn test_canonicalize_drops_nulls_recursively() {
        let value = serde_json::json!({"a": null, "b": {"c": null, "d": 1}});
        let canonical = canonicalize(value);
        assert_eq!(canonical, serde_json::json!({"b": {"d": 1}}));
    }
}
