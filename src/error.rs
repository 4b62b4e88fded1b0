//! Error types for the sandbox plugin.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Input validation error from the guard layer
    #[error("Validation error")]
    #[diagnostic(code(sandbox::validation))]
    Validation(#[from] ValidationError),

    /// Docker CLI error
    #[error("Docker error")]
    #[diagnostic(code(sandbox::docker))]
    Docker(#[from] DockerError),

    /// Registry error
    #[error("Registry error")]
    #[diagnostic(code(sandbox::registry))]
    Registry(#[from] RegistryError),

    /// Legacy registry migration error
    #[error("Registry migration error")]
    #[diagnostic(code(sandbox::migration))]
    Migration(#[from] MigrationError),

    /// Workspace preparation error
    #[error("Workspace error")]
    #[diagnostic(code(sandbox::workspace))]
    Workspace(#[from] WorkspaceError),

    /// Runtime context error
    #[error("Runtime error")]
    #[diagnostic(code(sandbox::runtime))]
    Runtime(#[from] RuntimeError),
}

/// Errors surfaced synchronously by the shell/identifier guards.
#[derive(Error, Debug, Diagnostic)]
pub enum ValidationError {
    /// Command is empty after trimming
    #[error("command is empty")]
    #[diagnostic(code(sandbox::validation::empty_command))]
    EmptyCommand,

    /// Command contains a null byte
    #[error("command contains null bytes")]
    #[diagnostic(code(sandbox::validation::null_byte))]
    NullByteInCommand,

    /// Command contains a shell metacharacter
    #[error("command contains shell metacharacter '{ch}'")]
    #[diagnostic(
        code(sandbox::validation::metacharacter),
        help("pass an argv to exec_in_container_raw to use shell features explicitly")
    )]
    ForbiddenMetacharacter { ch: char },

    /// Environment variable key is not a valid POSIX identifier
    #[error("invalid environment variable key: {key:?}")]
    #[diagnostic(
        code(sandbox::validation::env_key),
        help("keys must match ^[A-Za-z_][A-Za-z0-9_]*$")
    )]
    InvalidEnvKey { key: String },

    /// Raw exec was called with an empty argv
    #[error("argv must not be empty")]
    #[diagnostic(code(sandbox::validation::empty_argv))]
    EmptyArgv,
}

/// Errors from the Docker CLI driver.
#[derive(Error, Debug, Diagnostic)]
pub enum DockerError {
    /// docker exited non-zero and the caller did not allow failure
    #[error("docker command failed: {stderr}")]
    #[diagnostic(code(sandbox::docker::command_failed))]
    CommandFailed { stderr: String },

    /// The docker client could not be spawned or awaited
    #[error("failed to run docker ({context})")]
    #[diagnostic(
        code(sandbox::docker::spawn),
        help("is the docker CLI installed and on PATH?")
    )]
    Spawn {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A non-default image is missing locally
    #[error("image {image:?} not found locally")]
    #[diagnostic(
        code(sandbox::docker::image_missing),
        help("pull the image with `docker pull <image>` or configure a different one")
    )]
    ImageMissing { image: String },
}

/// Errors from the persistent container registry.
#[derive(Error, Debug, Diagnostic)]
pub enum RegistryError {
    /// Insert hit an existing record with the same primary key
    #[error("registry record already exists: {id}")]
    #[diagnostic(code(sandbox::registry::conflict))]
    Conflict { id: String },

    /// I/O error from the backing store
    #[error("registry I/O error: {context}")]
    #[diagnostic(code(sandbox::registry::io))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Record (de)serialization error
    #[error("registry encoding error: {context}")]
    #[diagnostic(code(sandbox::registry::encode))]
    Encode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the one-shot legacy registry import.
#[derive(Error, Debug, Diagnostic)]
pub enum MigrationError {
    /// Legacy file could not be read
    #[error("failed to read legacy registry {path}")]
    #[diagnostic(code(sandbox::migration::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Legacy file is not valid JSON
    #[error("failed to parse legacy registry {path}: {reason}")]
    #[diagnostic(code(sandbox::migration::parse))]
    Parse { path: String, reason: String },

    /// Legacy file could not be renamed aside after import
    #[error("failed to rename legacy registry {from} to {to}")]
    #[diagnostic(code(sandbox::migration::rename))]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    /// Upsert into the repository failed
    #[error("failed to store migrated record")]
    #[diagnostic(code(sandbox::migration::store))]
    Store(#[from] RegistryError),
}

/// Errors preparing per-session workspace directories.
#[derive(Error, Debug, Diagnostic)]
pub enum WorkspaceError {
    /// Directory creation failed
    #[error("failed to create workspace directory {path}")]
    #[diagnostic(code(sandbox::workspace::create))]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the process-wide runtime context.
#[derive(Error, Debug, Diagnostic)]
pub enum RuntimeError {
    /// init was called a second time
    #[error("sandbox runtime context is already initialized")]
    #[diagnostic(code(sandbox::runtime::reinit))]
    AlreadyInitialized,
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
