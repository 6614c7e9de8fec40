//! Runner process launcher.
//!
//! Spawns the runner with:
//! - `kill_on_drop(true)` so a dropped handle never leaks a process.
//! - piped stdin/stdout for the line protocol.
//! - stderr appended to the runner log, so startup failures (missing model,
//!   unavailable device) show up in the log tail reported on channel errors.

use std::fs::{self, OpenOptions};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::runner::process::ProcessHandle;
use crate::{IntentError, Result};

/// Starts a runner for a validated [`RunnerConfig`].
///
/// Called on the worker thread from inside its tokio runtime, so
/// implementations may spawn tasks or child processes directly.
pub trait Launcher: Send {
    /// Start a runner and return a channel to it.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Process`] if the runner cannot be started.
    fn launch(&mut self, config: &RunnerConfig) -> Result<ProcessHandle>;
}

/// Launches the runner as an OS subprocess via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&mut self, config: &RunnerConfig) -> Result<ProcessHandle> {
        let mut cmd = Command::new(&config.python_path);
        cmd.args(config.command_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr_sink(config))
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            IntentError::Process(format!(
                "failed to spawn runner {}: {err}",
                config.python_path.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IntentError::Process("failed to capture runner stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IntentError::Process("failed to capture runner stdout".into()))?;

        info!(
            pid = child.id().unwrap_or(0),
            program = %config.python_path.display(),
            runner = %config.runner_path.display(),
            backend = config.backend.as_arg(),
            "runner process spawned"
        );

        Ok(ProcessHandle::from_child(
            child,
            stdin,
            stdout,
            config.log_path.clone(),
        ))
    }
}

fn stderr_sink(config: &RunnerConfig) -> Stdio {
    if let Some(parent) = config.log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!(%err, dir = %parent.display(), "failed to create runner log directory");
        }
    }
    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    {
        Ok(file) => Stdio::from(file),
        Err(err) => {
            warn!(%err, path = %config.log_path.display(), "runner stderr discarded");
            Stdio::null()
        }
    }
}
