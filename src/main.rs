//! Operator CLI for the sandbox plugin.
//!
//! Drives the same code paths the host runtime uses, against a file-backed
//! registry under `$WOPR_HOME`. Host configuration is read from
//! `$WOPR_HOME/config.json`; a missing file means an empty config.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use wopr_plugin_sandbox::config::TrustLevel;
use wopr_plugin_sandbox::constants::wopr_state_dir;
use wopr_plugin_sandbox::docker::{exec_in_container, ContainerExecOptions};
use wopr_plugin_sandbox::registry::JsonFileStore;
use wopr_plugin_sandbox::runtime::runtime;
use wopr_plugin_sandbox::sandbox::{
    get_sandbox_workspace_info, prune, prune_all, recreate_sandbox_container,
    resolve_sandbox_context, SessionRequest,
};
use wopr_plugin_sandbox::{plugin, resolve_sandbox_config};

/// WOPR sandbox operator tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve (and ensure) the sandbox context for a session
    Resolve {
        /// Session name
        #[arg(long)]
        session: String,
        /// Trust level: untrusted, semi-trusted or trusted
        #[arg(long)]
        trust: Option<TrustLevel>,
    },
    /// Show the workspace placement for a session without touching Docker
    WorkspaceInfo {
        #[arg(long)]
        session: String,
        #[arg(long)]
        trust: Option<TrustLevel>,
    },
    /// Run a command inside a session's sandbox container
    Exec {
        #[arg(long)]
        session: String,
        #[arg(long)]
        trust: Option<TrustLevel>,
        /// Working directory inside the container
        #[arg(long)]
        workdir: Option<String>,
        /// Environment entries, KEY=VALUE, repeatable
        #[arg(long = "env")]
        env: Vec<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// The command to run through `sh -c`
        command: String,
    },
    /// Remove and recreate a session's container with the current config
    Recreate {
        #[arg(long)]
        session: String,
        #[arg(long)]
        trust: Option<TrustLevel>,
    },
    /// Run one prune pass with the configured thresholds
    Prune {
        /// Session whose prune thresholds apply
        #[arg(long, default_value = "main")]
        session: String,
    },
    /// Remove every registered sandbox container
    PruneAll,
}

fn load_main_config() -> serde_json::Value {
    let path = wopr_state_dir().join("config.json");
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

fn parse_env_pairs(pairs: &[String]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .filter_map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

fn registry_path() -> PathBuf {
    wopr_state_dir().join("sandbox").join("registry.json")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).into_diagnostic()?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let store = Arc::new(
        JsonFileStore::open(registry_path())
            .await
            .into_diagnostic()?,
    );
    plugin::init(store, Arc::new(load_main_config))
        .await
        .into_diagnostic()?;

    match cli.command {
        Command::Resolve { session, trust } => {
            let context = resolve_sandbox_context(SessionRequest {
                session_name: &session,
                trust_level: trust,
            })
            .await
            .into_diagnostic()?;
            match context {
                Some(context) => print_json(&context)?,
                None => info!(session = %session, "session is not sandboxed"),
            }
        }
        Command::WorkspaceInfo { session, trust } => {
            let info = get_sandbox_workspace_info(SessionRequest {
                session_name: &session,
                trust_level: trust,
            });
            print_json(&info)?;
        }
        Command::Exec {
            session,
            trust,
            workdir,
            env,
            timeout,
            command,
        } => {
            let context = resolve_sandbox_context(SessionRequest {
                session_name: &session,
                trust_level: trust,
            })
            .await
            .into_diagnostic()?
            .ok_or_else(|| miette::miette!("session {session:?} is not sandboxed"))?;

            let options = ContainerExecOptions {
                workdir,
                env: parse_env_pairs(&env),
                timeout_secs: timeout,
            };
            let result = exec_in_container(&context.container_name, &command, &options)
                .await
                .into_diagnostic()?;

            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            std::process::exit(result.exit_code);
        }
        Command::Recreate { session, trust } => {
            let context = recreate_sandbox_container(SessionRequest {
                session_name: &session,
                trust_level: trust,
            })
            .await
            .into_diagnostic()?;
            match context {
                Some(context) => {
                    info!(container = %context.container_name, "container recreated");
                    print_json(&context)?;
                }
                None => info!(session = %session, "session is not sandboxed"),
            }
        }
        Command::Prune { session } => {
            let cfg = resolve_sandbox_config(&session, None, &runtime().main_config());
            let removed = prune(runtime().store().as_ref(), &cfg.prune)
                .await
                .into_diagnostic()?;
            info!(removed, "prune pass complete");
        }
        Command::PruneAll => {
            let removed = prune_all(runtime().store().as_ref())
                .await
                .into_diagnostic()?;
            info!(removed, "all sandbox containers removed");
        }
    }

    Ok(())
}
