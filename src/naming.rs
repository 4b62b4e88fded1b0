//! Deterministic naming for containers and workspace directories.
//!
//! Session keys arrive as free-form strings (session names chosen by users
//! or upstream channels). Container names and workspace directory names must
//! be filesystem- and Docker-safe, stable across restarts, and collision
//! resistant, so every derived name is a bounded slug plus a short digest of
//! the original key.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::SandboxScope;
use crate::constants::{MAIN_SESSION_NAME, SHARED_SCOPE_KEY};

/// Maximum length of the readable slug body, before the digest suffix.
const SLUG_MAX_LEN: usize = 32;

/// Fallback slug body for blank or fully stripped keys.
const SLUG_FALLBACK: &str = "session";

/// Derives a container-name-safe slug from a session key.
///
/// The key is trimmed and lowercased; runs of characters outside
/// `[a-z0-9._-]` collapse to a single `-`; leading/trailing `-` are
/// stripped; the body is capped at 32 characters with `"session"` as the
/// fallback for empty results. An 8-hex-character SHA-256 suffix of the
/// trimmed key keeps distinct keys distinct after truncation.
///
/// The output is deterministic and matches
/// `^[a-z0-9._-]{1,32}-[0-9a-f]{8}$`.
#[must_use]
pub fn slugify_session_key(session_key: &str) -> String {
    let trimmed = session_key.trim();
    let body_source = if trimmed.is_empty() {
        SLUG_FALLBACK
    } else {
        trimmed
    };

    let mut body = String::new();
    let mut pending_gap = false;
    for ch in body_source.to_lowercase().chars() {
        if matches!(ch, 'a'..='z' | '0'..='9' | '.' | '_' | '-') {
            if pending_gap && !body.is_empty() {
                body.push('-');
            }
            pending_gap = false;
            body.push(ch);
        } else {
            pending_gap = true;
        }
    }

    let body: String = body.trim_matches('-').chars().take(SLUG_MAX_LEN).collect();
    let body = if body.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        body
    };

    let digest = format!("{:x}", Sha256::digest(trimmed.as_bytes()));
    format!("{body}-{}", &digest[..8])
}

/// Resolves the scope key a session maps to.
///
/// Shared scope always maps to the fixed `"shared"` key; session scope uses
/// the trimmed session key, falling back to `"main"` when blank.
#[must_use]
pub fn resolve_sandbox_scope_key(scope: SandboxScope, session_key: &str) -> String {
    match scope {
        SandboxScope::Shared => SHARED_SCOPE_KEY.to_string(),
        SandboxScope::Session => {
            let trimmed = session_key.trim();
            if trimmed.is_empty() {
                MAIN_SESSION_NAME.to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

/// Workspace directory for a session key under the given root.
#[must_use]
pub fn resolve_sandbox_workspace_dir(root: &Path, session_key: &str) -> PathBuf {
    root.join(slugify_session_key(session_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_is_deterministic() {
        assert_eq!(slugify_session_key("My Session"), slugify_session_key("My Session"));
    }

    #[test]
    fn test_slug_lowercases_and_collapses() {
        let slug = slugify_session_key("My  Cool Session!!");
        assert!(slug.starts_with("my-cool-session-"), "got {slug}");
    }

    #[test]
    fn test_slug_shape() {
        for key in ["main", "  padded  ", "ALL CAPS", "weird/../chars", "", "日本語"] {
            let slug = slugify_session_key(key);
            let (body, digest) = slug.rsplit_once('-').expect("digest suffix");
            assert!(!body.is_empty() && body.len() <= 32, "body {body:?}");
            assert_eq!(digest.len(), 8);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(slug.len() <= 41, "slug too long: {slug}");
        }
    }

    #[test]
    fn test_slug_blank_falls_back() {
        let slug = slugify_session_key("   ");
        assert!(slug.starts_with("session-"), "got {slug}");
    }

    #[test]
    fn test_slug_strips_edge_dashes() {
        let slug = slugify_session_key("--abc--");
        assert!(slug.starts_with("abc-"), "got {slug}");
    }

    #[test]
    fn test_slug_distinct_keys_distinct_suffix() {
        // Same body after truncation, different digests.
        let a = slugify_session_key("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1");
        let b = slugify_session_key("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_scope_key_shared() {
        assert_eq!(
            resolve_sandbox_scope_key(SandboxScope::Shared, "anything"),
            "shared"
        );
    }

    #[test]
    fn test_scope_key_session() {
        assert_eq!(
            resolve_sandbox_scope_key(SandboxScope::Session, "  dev  "),
            "dev"
        );
        assert_eq!(resolve_sandbox_scope_key(SandboxScope::Session, ""), "main");
    }

    #[test]
    fn test_workspace_dir_join() {
        let dir = resolve_sandbox_workspace_dir(Path::new("/srv/ws"), "dev");
        assert!(dir.starts_with("/srv/ws"));
        assert!(dir.to_string_lossy().contains("dev-"));
    }
}
