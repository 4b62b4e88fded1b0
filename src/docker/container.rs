//! Container creation and in-container command execution.
//!
//! Containers are created stopped, started eagerly, and kept alive with
//! `sleep infinity`; commands then run through `docker exec`. The shell
//! path (`exec_in_container`) funnels a validated command string through
//! `sh -c`; the raw path (`exec_in_container_raw`) takes an argv and never
//! touches a shell.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument};

use super::args::{build_sandbox_create_args, CreateArgs};
use super::{ensure_docker_image, exec_docker};
use crate::config::{SandboxDockerConfig, WorkspaceAccess};
use crate::error::{DockerError, Result, ValidationError};
use crate::shell::{validate_command, validate_env_key};

/// Exit code reported when an in-container command hits its timeout, after
/// the docker client has been killed.
pub const EXEC_TIMEOUT_EXIT_CODE: i32 = 124;

/// Options for one in-container execution.
#[derive(Debug, Clone, Default)]
pub struct ContainerExecOptions {
    /// Working directory inside the container; defaults to the container's
    /// configured workdir.
    pub workdir: Option<String>,
    /// Extra environment passed via `-e`.
    pub env: BTreeMap<String, String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Result of one in-container execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ContainerExecResult {
    /// Whether the command exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Inputs for creating one sandbox container.
#[derive(Debug, Clone)]
pub struct CreateContainerParams<'a> {
    pub name: &'a str,
    pub cfg: &'a SandboxDockerConfig,
    pub scope_key: &'a str,
    pub workspace_dir: &'a Path,
    pub workspace_access: WorkspaceAccess,
    pub created_at_ms: Option<i64>,
    pub config_hash: Option<&'a str>,
}

/// Creates and starts a sandbox container, then runs the configured setup
/// command, if any, through the shell path.
///
/// # Errors
///
/// Fails if the image cannot be ensured, any docker invocation fails, or
/// the setup command fails validation.
#[instrument(skip(params), fields(container = params.name, image = %params.cfg.image))]
pub async fn create_container(params: CreateContainerParams<'_>) -> Result<()> {
    let cfg = params.cfg;
    ensure_docker_image(&cfg.image).await?;

    let mut args = build_sandbox_create_args(&CreateArgs {
        name: params.name,
        cfg,
        scope_key: params.scope_key,
        created_at_ms: params.created_at_ms,
        labels: None,
        config_hash: params.config_hash,
    });

    args.push("--workdir".into());
    args.push(cfg.workdir.clone());

    let workspace = params.workspace_dir.display();
    match params.workspace_access {
        WorkspaceAccess::Rw => {
            args.push("-v".into());
            args.push(format!("{workspace}:{}", cfg.workdir));
        }
        WorkspaceAccess::Ro => {
            args.push("-v".into());
            args.push(format!("{workspace}:{}:ro", cfg.workdir));
        }
        WorkspaceAccess::None => {}
    }

    args.push(cfg.image.clone());
    args.push("sleep".into());
    args.push("infinity".into());

    exec_docker(&args, false).await?;
    exec_docker(&["start".to_string(), params.name.to_string()], false).await?;
    debug!("container created and started");

    if let Some(setup) = cfg.setup_command.as_deref() {
        if !setup.trim().is_empty() {
            let command = validate_command(setup)?;
            debug!(%command, "running setup command");
            exec_docker(
                &[
                    "exec".to_string(),
                    "-i".to_string(),
                    params.name.to_string(),
                    "sh".to_string(),
                    "-c".to_string(),
                    "--".to_string(),
                    command,
                ],
                false,
            )
            .await?;
        }
    }

    Ok(())
}

/// Runs a command inside a container through `sh -c`.
///
/// The command is validated against shell metacharacters first; environment
/// keys are passed through as given (the raw path is the one that vets
/// keys).
///
/// # Errors
///
/// Fails on command validation or when the docker client cannot be spawned.
/// A non-zero in-container exit is reported in the result, not as an error.
#[instrument(skip(command, options), fields(container = name))]
pub async fn exec_in_container(
    name: &str,
    command: &str,
    options: &ContainerExecOptions,
) -> Result<ContainerExecResult> {
    let command = validate_command(command)?;

    let mut args: Vec<String> = vec!["exec".into(), "-i".into()];
    push_exec_options(&mut args, options);
    args.push(name.to_string());
    args.push("sh".into());
    args.push("-c".into());
    args.push("--".into());
    args.push(command);

    run_docker_client(&args, options.timeout_secs).await
}

/// Runs an argv inside a container, bypassing any shell.
///
/// # Errors
///
/// Fails on an empty argv or an invalid environment key, or when the docker
/// client cannot be spawned.
#[instrument(skip(argv, options), fields(container = name))]
pub async fn exec_in_container_raw(
    name: &str,
    argv: &[String],
    options: &ContainerExecOptions,
) -> Result<ContainerExecResult> {
    if argv.is_empty() {
        return Err(ValidationError::EmptyArgv.into());
    }
    for key in options.env.keys() {
        validate_env_key(key)?;
    }

    let mut args: Vec<String> = vec!["exec".into(), "-i".into()];
    push_exec_options(&mut args, options);
    args.push(name.to_string());
    args.extend(argv.iter().cloned());

    run_docker_client(&args, options.timeout_secs).await
}

fn push_exec_options(args: &mut Vec<String>, options: &ContainerExecOptions) {
    if let Some(workdir) = &options.workdir {
        args.push("-w".into());
        args.push(workdir.clone());
    }
    for (key, value) in &options.env {
        args.push("-e".into());
        args.push(format!("{key}={value}"));
    }
}

/// Spawns the docker client and waits for completion, enforcing the
/// optional timeout. On expiry the client process is killed (taking the
/// exec session with it) and the result carries
/// [`EXEC_TIMEOUT_EXIT_CODE`].
async fn run_docker_client(
    args: &[String],
    timeout_secs: Option<u64>,
) -> Result<ContainerExecResult> {
    let child = Command::new("docker")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the wait future on timeout must not leak the client.
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DockerError::Spawn {
            context: "exec".to_string(),
            source: e,
        })?;

    let wait = child.wait_with_output();
    let output = match timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), wait).await {
            Ok(result) => result,
            Err(_) => {
                debug!(timeout_secs = secs, "in-container command timed out");
                return Ok(ContainerExecResult {
                    stdout: String::new(),
                    stderr: format!("command timed out after {secs}s"),
                    exit_code: EXEC_TIMEOUT_EXIT_CODE,
                });
            }
        },
        None => wait.await,
    };

    let output = output.map_err(|e| DockerError::Spawn {
        context: "waiting for docker exec".to_string(),
        source: e,
    })?;

    Ok(ContainerExecResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(1),
    })
}
