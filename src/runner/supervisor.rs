//! Runner lifecycle and request/response exchange.
//!
//! State machine:
//!
//! ```text
//! Stopped --spawn--> Cold --first accepted exchange--> Warm
//!    ^                 |                                 |
//!    +---- config change | terminate | exit -------------+
//! ```
//!
//! The supervisor is owned by the worker thread and never shared, so it
//! carries no locks.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::models::{Request, RequestId, Response};
use crate::protocol::{decode_line, encode_request, WireResponse, SHUTDOWN_LINE};
use crate::runner::launcher::Launcher;
use crate::runner::process::{ProcessHandle, ReadEvent};
use crate::{IntentError, Result};

/// How long a runner gets to acknowledge the shutdown sentinel before it is killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Minimum timeout for the first exchange after a spawn.
pub const DEFAULT_COLD_START_GRACE: Duration = Duration::from_secs(120);

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// No runner process.
    Stopped,
    /// Runner spawned; no exchange has completed yet.
    Cold,
    /// At least one exchange has completed on the current runner.
    Warm,
}

struct ActiveRunner {
    config: RunnerConfig,
    process: ProcessHandle,
}

/// Keeps at most one runner alive and exchanges requests with it.
pub struct Supervisor<L> {
    launcher: L,
    active: Option<ActiveRunner>,
    cold_start_grace: Duration,
    shutdown_grace: Duration,
    spawn_count: u64,
}

impl<L: Launcher> Supervisor<L> {
    /// Create a stopped supervisor.
    #[must_use]
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            active: None,
            cold_start_grace: DEFAULT_COLD_START_GRACE,
            shutdown_grace: SHUTDOWN_GRACE,
            spawn_count: 0,
        }
    }

    /// Override the cold-start grace period.
    #[must_use]
    pub fn with_cold_start_grace(mut self, grace: Duration) -> Self {
        self.cold_start_grace = grace;
        self
    }

    /// Override the shutdown acknowledgement window.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub(crate) fn set_cold_start_grace(&mut self, grace: Duration) {
        self.cold_start_grace = grace;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        match &self.active {
            None => RunnerState::Stopped,
            Some(active) if active.process.is_warm() => RunnerState::Warm,
            Some(_) => RunnerState::Cold,
        }
    }

    /// Configuration of the live runner, if any.
    #[must_use]
    pub fn active_config(&self) -> Option<&RunnerConfig> {
        self.active.as_ref().map(|active| &active.config)
    }

    /// Number of runners launched over this supervisor's lifetime.
    #[must_use]
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count
    }

    /// Make sure a runner matching `config` is alive.
    ///
    /// No-op when the live runner was started from an equal config and has
    /// not exited. Otherwise any existing runner is shut down first, then the
    /// config is validated, then a new runner is launched.
    ///
    /// # Errors
    ///
    /// - [`IntentError::Config`] when the config lacks fields the backend
    ///   requires; nothing is spawned.
    /// - [`IntentError::Process`] when the launch fails.
    pub async fn ensure_running(&mut self, config: &RunnerConfig) -> Result<()> {
        if let Some(active) = self.active.as_mut() {
            if active.config == *config && !active.process.has_exited() {
                return Ok(());
            }
            if active.config == *config {
                info!("runner exited; respawning");
            } else {
                info!("runner configuration changed; restarting");
            }
        }

        self.shutdown().await;
        config.validate()?;

        let process = self.launcher.launch(config)?;
        self.spawn_count += 1;
        debug!(pid = process.pid(), spawn = self.spawn_count, "runner running (cold)");
        self.active = Some(ActiveRunner {
            config: config.clone(),
            process,
        });
        Ok(())
    }

    /// Send `request` and wait for the line that answers it.
    ///
    /// `timeout` of `None` waits indefinitely. While the runner is cold, a
    /// finite timeout is raised to the cold-start grace period.
    ///
    /// # Errors
    ///
    /// - [`IntentError::Process`] when no runner is alive, the write fails,
    ///   the output channel breaks, or the runner exits. Channel failures
    ///   carry the tail of the runner log when one is available.
    /// - [`IntentError::Protocol`] on timeout or when the matching line is
    ///   malformed.
    ///
    /// Callers must [`terminate`](Self::terminate) after any error.
    pub async fn send_request(
        &mut self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let cold_start_grace = self.cold_start_grace;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| IntentError::Process("runner is not running".into()))?;

        let line = encode_request(request)?;
        active.process.write_line(&line).await?;

        let effective = effective_timeout(timeout, active.process.is_warm(), cold_start_grace);
        let (wire, raw) = read_matching(&mut active.process, &request.id, effective).await?;
        active.process.mark_warm();

        Ok(Response {
            request_id: request.id.clone(),
            subject: request.subject.clone(),
            ok: wire.ok,
            text: wire.text,
            error: wire.error,
            raw,
        })
    }

    /// Kill the runner without ceremony. Used after protocol failures so a
    /// poisoned process is never reused.
    pub async fn terminate(&mut self) {
        if let Some(mut active) = self.active.take() {
            warn!(pid = active.process.pid(), "terminating runner");
            active.process.kill().await;
        }
    }

    /// Ask the runner to exit, wait briefly for its acknowledgement, then kill it.
    pub async fn shutdown(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let pid = active.process.pid();

        if !active.process.has_exited() {
            match active.process.write_line(SHUTDOWN_LINE).await {
                Ok(()) => {
                    let sentinel = RequestId::shutdown();
                    match read_matching(&mut active.process, &sentinel, Some(self.shutdown_grace))
                        .await
                    {
                        Ok(_) => debug!(pid, "runner acknowledged shutdown"),
                        Err(err) => debug!(pid, %err, "no shutdown acknowledgement"),
                    }
                }
                Err(err) => debug!(pid, %err, "could not deliver shutdown sentinel"),
            }
        }

        active.process.kill().await;
        info!(pid, "runner stopped");
    }
}

/// Timeout applied to one exchange.
///
/// A cold runner gets at least `cold_start_grace`; `None` stays unbounded.
#[must_use]
pub fn effective_timeout(
    timeout: Option<Duration>,
    warm: bool,
    cold_start_grace: Duration,
) -> Option<Duration> {
    match timeout {
        Some(t) if !warm => Some(t.max(cold_start_grace)),
        other => other,
    }
}

async fn read_matching(
    process: &mut ProcessHandle,
    expected: &RequestId,
    timeout: Option<Duration>,
) -> Result<(WireResponse, String)> {
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let event = match deadline {
            Some(deadline) => {
                if let Ok(event) = tokio::time::timeout_at(deadline, process.next_event()).await {
                    event
                } else {
                    return Err(IntentError::Protocol(format!(
                        "runner response timed out after {:?}",
                        timeout.unwrap_or_default()
                    )));
                }
            }
            None => process.next_event().await,
        };

        match event {
            ReadEvent::Line(line) => match decode_line(&line, expected) {
                Ok(Some(wire)) => return Ok((wire, line)),
                Ok(None) => {}
                Err(err) => return Err(err.into()),
            },
            ReadEvent::Broken(IntentError::Protocol(msg)) => {
                return Err(IntentError::Protocol(msg));
            }
            ReadEvent::Broken(err) => {
                return Err(IntentError::Process(with_log_tail(
                    &strip_prefix(&err),
                    process,
                )));
            }
            ReadEvent::Exited(reason) => {
                return Err(IntentError::Process(with_log_tail(&reason, process)));
            }
        }
    }
}

fn strip_prefix(err: &IntentError) -> String {
    match err {
        IntentError::Config(msg)
        | IntentError::Process(msg)
        | IntentError::Protocol(msg)
        | IntentError::Parse(msg)
        | IntentError::Io(msg) => msg.clone(),
    }
}

fn with_log_tail(reason: &str, process: &ProcessHandle) -> String {
    match process.log_tail() {
        Some(tail) => format!("{reason}\nrunner log tail:\n{tail}"),
        None => reason.to_owned(),
    }
}
