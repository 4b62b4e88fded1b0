//! Tool policy acceptance and rejection suites.

use wopr_plugin_sandbox::config::SandboxToolPolicy;
use wopr_plugin_sandbox::policy::{filter_tools_by_policy, is_tool_allowed, CompiledToolPolicy};

fn policy(allow: &[&str], deny: &[&str]) -> SandboxToolPolicy {
    SandboxToolPolicy {
        allow: Some(allow.iter().map(ToString::to_string).collect()),
        deny: Some(deny.iter().map(ToString::to_string).collect()),
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

#[test]
fn glob_allow_partitions_tools() {
    let tools = names(&["memory_read", "memory_write", "exec_command"]);
    let filtered = filter_tools_by_policy(&tools, &policy(&["memory_*"], &[]));
    assert_eq!(filtered.allowed, names(&["memory_read", "memory_write"]));
    assert_eq!(filtered.denied, names(&["exec_command"]));
}

#[test]
fn deny_beats_allow_on_same_tool() {
    let p = policy(&["exec_command"], &["exec_command"]);
    assert!(!is_tool_allowed(&p, "exec_command"));
}

#[test]
fn deny_dominates_whenever_it_matches() {
    let p = policy(&["*"], &["net_*"]);
    assert!(is_tool_allowed(&p, "fs_read"));
    assert!(!is_tool_allowed(&p, "net_fetch"));
    assert!(!is_tool_allowed(&p, "NET_FETCH"), "deny is case-insensitive");
}

#[test]
fn empty_allow_means_allow_all_not_denied() {
    let p = policy(&[], &["danger_tool"]);
    assert!(is_tool_allowed(&p, "anything"));
    assert!(!is_tool_allowed(&p, "danger_tool"));
}

#[test]
fn absent_lists_allow_everything() {
    let p = SandboxToolPolicy::default();
    assert!(is_tool_allowed(&p, "whatever"));
}

#[test]
fn partition_is_a_permutation_preserving_order() {
    let tools = names(&["a_one", "b_two", "a_three", "c_four", "a_five"]);
    let filtered = filter_tools_by_policy(&tools, &policy(&["a_*"], &[]));

    assert_eq!(filtered.allowed, names(&["a_one", "a_three", "a_five"]));
    assert_eq!(filtered.denied, names(&["b_two", "c_four"]));
    assert_eq!(
        filtered.allowed.len() + filtered.denied.len(),
        tools.len(),
        "partition must cover the input"
    );
    for tool in &tools {
        assert!(
            filtered.allowed.contains(tool) ^ filtered.denied.contains(tool),
            "{tool} must land in exactly one half"
        );
    }
}

#[test]
fn normalization_applies_to_names_and_patterns() {
    let p = policy(&["  Memory_*  "], &[]);
    assert!(is_tool_allowed(&p, "memory_read"));
    assert!(is_tool_allowed(&p, "  MEMORY_READ  "));
}

#[test]
fn malformed_lists_treated_as_absent() {
    let parsed: SandboxToolPolicy =
        serde_json::from_value(serde_json::json!({"allow": 42, "deny": {"x": 1}})).unwrap();
    assert!(parsed.allow.is_none());
    assert!(parsed.deny.is_none());
    assert!(is_tool_allowed(&parsed, "anything"));
}

#[test]
fn compiled_policy_matches_one_shot_results() {
    let raw = policy(&["memory_*", "fs_read"], &["memory_admin", "*_debug"]);
    let compiled = CompiledToolPolicy::from_policy(&raw);
    for tool in [
        "memory_read",
        "memory_admin",
        "fs_read",
        "fs_write",
        "tool_debug",
    ] {
        assert_eq!(
            compiled.is_allowed(tool),
            is_tool_allowed(&raw, tool),
            "compiled and one-shot disagree on {tool}"
        );
    }
}
