//! Tool invocation policy engine.
//!
//! Allow/deny patterns are compiled once into a tagged form (match-all,
//! exact, or anchored regex for globs) so the evaluation hot path never
//! re-parses pattern strings. Matching is case-insensitive on both sides;
//! deny always wins, and an empty allow list means "allow anything not
//! denied".

use regex::Regex;

use crate::config::{ResolvedToolPolicy, SandboxToolPolicy};

/// A compiled tool pattern.
#[derive(Debug, Clone)]
pub enum ToolPattern {
    /// Bare `*`: matches every tool.
    All,
    /// No wildcard: exact match on the normalized name.
    Exact(String),
    /// Contains `*`: anchored regex with each `*` matching any run.
    Glob(Regex),
}

impl ToolPattern {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(pattern) => pattern == normalized,
            Self::Glob(regex) => regex.is_match(normalized),
        }
    }
}

/// Compiles raw pattern strings, dropping blanks.
#[must_use]
pub fn compile_tool_patterns(patterns: &[String]) -> Vec<ToolPattern> {
    patterns
        .iter()
        .filter_map(|raw| {
            let normalized = raw.trim().to_lowercase();
            if normalized.is_empty() {
                return None;
            }
            if normalized == "*" {
                return Some(ToolPattern::All);
            }
            if normalized.contains('*') {
                let escaped = regex::escape(&normalized).replace("\\*", ".*");
                // Escaped input plus `.*` is always a valid pattern.
                #[allow(clippy::expect_used)]
                let regex =
                    Regex::new(&format!("^{escaped}$")).expect("escaped glob compiles");
                return Some(ToolPattern::Glob(regex));
            }
            Some(ToolPattern::Exact(normalized))
        })
        .collect()
}

/// A tool policy with both lists compiled, ready for repeated evaluation.
#[derive(Debug, Clone, Default)]
pub struct CompiledToolPolicy {
    allow: Vec<ToolPattern>,
    deny: Vec<ToolPattern>,
}

impl CompiledToolPolicy {
    /// Compiles explicit allow and deny lists.
    #[must_use]
    pub fn new(allow: &[String], deny: &[String]) -> Self {
        Self {
            allow: compile_tool_patterns(allow),
            deny: compile_tool_patterns(deny),
        }
    }

    /// Compiles a raw configured policy; absent lists compile to empty.
    #[must_use]
    pub fn from_policy(policy: &SandboxToolPolicy) -> Self {
        Self::new(
            policy.allow.as_deref().unwrap_or_default(),
            policy.deny.as_deref().unwrap_or_default(),
        )
    }

    /// Compiles a resolved policy.
    #[must_use]
    pub fn from_resolved(policy: &ResolvedToolPolicy) -> Self {
        Self::new(&policy.allow, &policy.deny)
    }

    /// Evaluates a tool name: denied if any deny pattern matches, otherwise
    /// allowed if the allow list is empty or any allow pattern matches.
    #[must_use]
    pub fn is_allowed(&self, tool: &str) -> bool {
        let normalized = tool.trim().to_lowercase();
        if self.deny.iter().any(|p| p.matches(&normalized)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|p| p.matches(&normalized))
    }
}

/// One-shot policy check. Compiles the policy per call; callers on a hot
/// path should hold a [`CompiledToolPolicy`] instead.
#[must_use]
pub fn is_tool_allowed(policy: &SandboxToolPolicy, tool: &str) -> bool {
    CompiledToolPolicy::from_policy(policy).is_allowed(tool)
}

/// Tools partitioned by a policy, both halves preserving input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredTools {
    pub allowed: Vec<String>,
    pub denied: Vec<String>,
}

/// Partitions tool names into allowed and denied, preserving input order.
#[must_use]
pub fn filter_tools_by_policy(tools: &[String], policy: &SandboxToolPolicy) -> FilteredTools {
    let compiled = CompiledToolPolicy::from_policy(policy);
    let mut allowed = Vec::new();
    let mut denied = Vec::new();
    for tool in tools {
        if compiled.is_allowed(tool) {
            allowed.push(tool.clone());
        } else {
            denied.push(tool.clone());
        }
    }
    FilteredTools { allowed, denied }
}
