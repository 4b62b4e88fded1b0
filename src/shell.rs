//! Shell and identifier guards for the in-container execution surface.
//!
//! Commands handed to `docker exec … sh -c` run through a POSIX shell, so
//! anything that could smuggle extra shell syntax is rejected up front.
//! Callers who genuinely need pipes, substitution or redirection use the
//! argv-based raw entry point instead, which bypasses the shell entirely.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

/// Characters that would be interpreted by `sh -c` beyond a simple command
/// word plus arguments.
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '<', '>', '\\'];

// The pattern is a literal; compilation cannot fail.
#[allow(clippy::expect_used)]
fn env_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("valid literal regex"))
}

/// Quotes a single argument for safe interpolation into a shell command.
///
/// Wraps the argument in single quotes, escaping embedded single quotes with
/// the standard `'\''` dance. An empty argument becomes `''`.
#[must_use]
pub fn shell_escape_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Validates a command string destined for `sh -c` inside a container.
///
/// Trims the input and rejects null bytes, empty commands, and any shell
/// metacharacter (`;`, `&`, `|`, backtick, `$`, `<`, `>`, `\`). Returns the
/// trimmed command on success.
///
/// # Errors
///
/// Returns `ValidationError` naming the offending input. The metacharacter
/// variant points callers at `exec_in_container_raw` for shell features.
pub fn validate_command(command: &str) -> Result<String, ValidationError> {
    if command.contains('\0') {
        return Err(ValidationError::NullByteInCommand);
    }

    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyCommand);
    }

    for ch in SHELL_METACHARACTERS {
        if trimmed.contains(*ch) {
            return Err(ValidationError::ForbiddenMetacharacter { ch: *ch });
        }
    }

    Ok(trimmed.to_string())
}

/// Validates an environment variable key as a POSIX identifier.
///
/// # Errors
///
/// Returns `ValidationError::InvalidEnvKey` if the key does not match
/// `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn validate_env_key(key: &str) -> Result<(), ValidationError> {
    if env_key_pattern().is_match(key) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEnvKey {
            key: key.to_string(),
        })
    }
}
