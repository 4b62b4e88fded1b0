//! Docker CLI driver.
//!
//! Every container operation shells out to the `docker` binary with piped
//! stdio. The CLI's textual output is part of the contract here: the
//! "No such image" stderr marker and the `<no value>` template result are
//! matched as constants in this module and nowhere else.

pub mod args;
pub mod container;

pub use args::{build_sandbox_create_args, CreateArgs};
pub use container::{
    create_container, exec_in_container, exec_in_container_raw, ContainerExecOptions,
    ContainerExecResult, CreateContainerParams, EXEC_TIMEOUT_EXIT_CODE,
};

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, trace};

use crate::constants::{DEFAULT_SANDBOX_IMAGE, LABEL_CONFIG_HASH, SANDBOX_BASE_IMAGE};
use crate::error::DockerError;

/// Stderr marker `docker image inspect` prints for a missing image.
pub const NO_SUCH_IMAGE_MARKER: &str = "No such image";

/// Result Go templates print for a missing map key.
pub const NO_VALUE_MARKER: &str = "<no value>";

/// Stderr marker for a `docker create` name collision, produced when two
/// sessions race to create the same scope's container.
pub const NAME_CONFLICT_MARKER: &str = "is already in use";

/// Captured output of one docker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

/// Existence and run state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerState {
    pub exists: bool,
    pub running: bool,
}

/// Runs `docker <args>` and captures both output streams.
///
/// With `allow_failure` the exit code is reported to the caller instead of
/// becoming an error; process-level spawn failures map to code 1 in that
/// mode so probing callers degrade gracefully on hosts without Docker.
///
/// # Errors
///
/// Without `allow_failure`, a non-zero exit fails with the trimmed stderr
/// (or a fallback message naming the exit code), and spawn failures fail
/// with the underlying I/O error.
#[instrument(skip(docker_args), fields(subcommand = docker_args.first().map(String::as_str).unwrap_or("")))]
pub async fn exec_docker(
    docker_args: &[String],
    allow_failure: bool,
) -> Result<DockerOutput, DockerError> {
    trace!(?docker_args, "running docker");
    let spawned = Command::new("docker")
        .args(docker_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match spawned {
        Ok(output) => output,
        Err(e) if allow_failure => {
            debug!(error = %e, "docker unavailable, reporting failure code");
            return Ok(DockerOutput {
                stdout: String::new(),
                stderr: e.to_string(),
                code: 1,
            });
        }
        Err(e) => {
            return Err(DockerError::Spawn {
                context: docker_args.first().cloned().unwrap_or_default(),
                source: e,
            });
        }
    };

    let code = output.status.code().unwrap_or(1);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if code != 0 && !allow_failure {
        let message = if stderr.trim().is_empty() {
            format!("docker exited with code {code}")
        } else {
            stderr.trim().to_string()
        };
        return Err(DockerError::CommandFailed { stderr: message });
    }

    Ok(DockerOutput {
        stdout,
        stderr,
        code,
    })
}

/// Whether an image exists locally.
///
/// # Errors
///
/// Inspect failures that are not the missing-image case surface as errors.
pub async fn docker_image_exists(image: &str) -> Result<bool, DockerError> {
    let output = exec_docker(
        &["image".to_string(), "inspect".to_string(), image.to_string()],
        true,
    )
    .await?;
    if output.code == 0 {
        return Ok(true);
    }
    if output.stderr.contains(NO_SUCH_IMAGE_MARKER) {
        return Ok(false);
    }
    Err(DockerError::CommandFailed {
        stderr: output.stderr.trim().to_string(),
    })
}

/// Makes sure `image` is available locally.
///
/// The default sandbox image is bootstrapped by pulling the Debian base
/// image and tagging it; any other missing image is a hard error telling
/// the operator to pull it themselves.
///
/// # Errors
///
/// Returns `DockerError::ImageMissing` for a missing non-default image, or
/// the underlying docker error if the pull/tag fails.
#[instrument]
pub async fn ensure_docker_image(image: &str) -> Result<(), DockerError> {
    if docker_image_exists(image).await? {
        return Ok(());
    }
    if image != DEFAULT_SANDBOX_IMAGE {
        return Err(DockerError::ImageMissing {
            image: image.to_string(),
        });
    }

    info!(base = SANDBOX_BASE_IMAGE, "bootstrapping default sandbox image");
    exec_docker(
        &["pull".to_string(), SANDBOX_BASE_IMAGE.to_string()],
        false,
    )
    .await?;
    exec_docker(
        &[
            "tag".to_string(),
            SANDBOX_BASE_IMAGE.to_string(),
            DEFAULT_SANDBOX_IMAGE.to_string(),
        ],
        false,
    )
    .await?;
    Ok(())
}

/// Inspects a container's existence and run state. A failed inspect means
/// the container does not exist.
pub async fn docker_container_state(name: &str) -> Result<ContainerState, DockerError> {
    let output = exec_docker(
        &[
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            name.to_string(),
        ],
        true,
    )
    .await?;
    if output.code != 0 {
        return Ok(ContainerState {
            exists: false,
            running: false,
        });
    }
    Ok(ContainerState {
        exists: true,
        running: output.stdout.trim() == "true",
    })
}

/// Reads the config-hash label off an existing container. Blank output and
/// the template's `<no value>` marker both mean the label is absent.
pub async fn read_container_config_hash(name: &str) -> Result<Option<String>, DockerError> {
    let output = exec_docker(
        &[
            "inspect".to_string(),
            "-f".to_string(),
            format!("{{{{index .Config.Labels \"{LABEL_CONFIG_HASH}\"}}}}"),
            name.to_string(),
        ],
        true,
    )
    .await?;
    if output.code != 0 {
        return Ok(None);
    }
    let value = output.stdout.trim();
    if value.is_empty() || value == NO_VALUE_MARKER {
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}
