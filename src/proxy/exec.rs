// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! How the proxy's syntax check and reload are executed.
//!
//! The validator and reloader share one [`ExecutionStrategy`], chosen once from
//! configuration in priority order:
//!
//! 1. **Custom** - an operator-supplied argv; `-t` or `-s reload` is appended
//! 2. **Container** - the proxy runs in a container reached through a runtime CLI
//!    (`docker exec <container> nginx ...`)
//! 3. **Local** - a locally installed proxy binary
//!
//! Subprocesses run through [`run_command`], which enforces a deadline, honors
//! cancellation and kills the child if either fires.

use crate::config::ProxyConfig;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where proxy commands are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Operator-supplied command prefix, e.g. `["sudo", "nginx"]`
    Custom { argv: Vec<String> },

    /// Proxy running inside a container
    Container {
        runtime: String,
        container: String,
        binary: String,
    },

    /// Proxy binary installed on this host
    Local { binary: String, pid_file: PathBuf },
}

impl ExecutionStrategy {
    /// Select the strategy from proxy configuration.
    ///
    /// A non-empty `check_command` wins, then a configured `container`, then the local
    /// binary.
    #[must_use]
    pub fn from_config(config: &ProxyConfig) -> Self {
        if let Some(argv) = config
            .check_command
            .as_ref()
            .filter(|argv| argv.first().is_some_and(|p| !p.trim().is_empty()))
        {
            return Self::Custom { argv: argv.clone() };
        }
        if let Some(container) = config
            .container
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            return Self::Container {
                runtime: config.container_runtime.clone(),
                container: container.to_string(),
                binary: config.binary.clone(),
            };
        }
        Self::Local {
            binary: config.binary.clone(),
            pid_file: config.pid_file.clone(),
        }
    }

    /// Short label used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Custom { .. } => "custom",
            Self::Container { .. } => "container",
            Self::Local { .. } => "local",
        }
    }

    /// Full argv for running the proxy binary with `args`.
    #[must_use]
    pub fn command(&self, args: &[&str]) -> Vec<String> {
        let mut argv = match self {
            Self::Custom { argv } => argv.clone(),
            Self::Container {
                runtime,
                container,
                binary,
            } => vec![
                runtime.clone(),
                "exec".to_string(),
                container.clone(),
                binary.clone(),
            ],
            Self::Local { binary, .. } => vec![binary.clone()],
        };
        argv.extend(args.iter().map(ToString::to_string));
        argv
    }

    /// Check whether the proxy this strategy talks to is reachable.
    ///
    /// - Custom commands are always considered reachable
    /// - Containers must be known to the runtime and running
    /// - The local proxy must have a pid file naming a live process
    ///
    /// Returns `Ok(false)` when the target is absent and an error only when the probe
    /// itself was cancelled.
    pub async fn target_running(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool, CommandError> {
        match self {
            Self::Custom { .. } => Ok(true),
            Self::Container {
                runtime, container, ..
            } => {
                let argv = vec![
                    runtime.clone(),
                    "inspect".to_string(),
                    "-f".to_string(),
                    "{{.State.Running}}".to_string(),
                    container.clone(),
                ];
                match run_command(&argv, timeout, cancel).await {
                    Ok(out) => Ok(out.success && out.output.trim() == "true"),
                    Err(CommandError::Cancelled) => Err(CommandError::Cancelled),
                    Err(e) => {
                        debug!(container = %container, error = %e, "Container probe failed");
                        Ok(false)
                    }
                }
            }
            Self::Local { pid_file, .. } => Ok(pid_file_names_live_process(pid_file)),
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, or `signal` when the process was killed by one
    pub status: String,
    /// stderr followed by stdout, trimmed
    pub output: String,
}

/// Why a subprocess did not produce a [`CommandOutput`].
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program does not exist
    #[error("command not found: {program}")]
    NotFound { program: String },

    /// The program exists but could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command timed out")]
    Timeout,

    #[error("command cancelled")]
    Cancelled,
}

/// Run `argv` to completion, bounded by `timeout` and `cancel`.
///
/// The child is killed when the deadline passes or the token is cancelled, so no
/// proxy command outlives its caller.
///
/// # Errors
///
/// Returns [`CommandError`] if `argv` is empty, the program cannot be started, or the
/// deadline or cancellation fires first.
pub async fn run_command(
    argv: &[String],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, CommandError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CommandError::NotFound {
            program: String::new(),
        });
    };

    debug!(command = %argv.join(" "), "Running proxy command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CommandError::NotFound {
                    program: program.clone(),
                }
            } else {
                CommandError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

    // Dropping the wait future drops the child, which kills it
    let output = tokio::select! {
        result = child.wait_with_output() => result.map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?,
        () = tokio::time::sleep(timeout) => return Err(CommandError::Timeout),
        () = cancel.cancelled() => return Err(CommandError::Cancelled),
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let combined = format!("{}\n{}", stderr.trim(), stdout.trim());

    Ok(CommandOutput {
        success: output.status.success(),
        status: output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string()),
        output: combined.trim().to_string(),
    })
}

/// True when `pid_file` holds the pid of a process that is still alive.
fn pid_file_names_live_process(pid_file: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(pid_file) else {
        return false;
    };
    let Ok(pid) = content.trim().parse::<u32>() else {
        return false;
    };
    process_alive(pid)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(pid: u32) -> bool {
    pid > 0
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod exec_tests;
