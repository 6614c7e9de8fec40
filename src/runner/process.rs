//! Duplex line channel to one runner.
//!
//! A [`ProcessHandle`] owns the write half (runner stdin), a framed read half
//! (runner stdout), and, for real subprocesses, the [`Child`] itself. The
//! supervisor only ever talks to this type, so it works the same over OS
//! pipes and over `tokio::io::duplex` streams.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::protocol::RunnerCodec;
use crate::{IntentError, Result};

/// Number of bytes read back from the runner log on channel failures.
pub const LOG_TAIL_BYTES: u64 = 4096;

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Next thing observed on the runner's output side.
#[derive(Debug)]
pub enum ReadEvent {
    /// One complete line, without its terminator.
    Line(String),
    /// The output channel failed or reached EOF.
    Broken(IntentError),
    /// The child process exited.
    Exited(String),
}

/// Owned channel to one runner instance.
pub struct ProcessHandle {
    child: Option<Child>,
    stdin: BoxedWriter,
    stdout: FramedRead<BoxedReader, RunnerCodec>,
    log_path: Option<PathBuf>,
    warm: bool,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid())
            .field("log_path", &self.log_path)
            .field("warm", &self.warm)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Wrap a spawned child and its captured pipes.
    #[must_use]
    pub fn from_child(child: Child, stdin: ChildStdin, stdout: ChildStdout, log_path: PathBuf) -> Self {
        let mut handle = Self::from_streams(stdout, stdin);
        handle.child = Some(child);
        handle.log_path = Some(log_path);
        handle
    }

    /// Wrap an arbitrary pair of byte streams with no backing process.
    #[must_use]
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            child: None,
            stdin: Box::new(writer),
            stdout: FramedRead::new(Box::new(reader) as BoxedReader, RunnerCodec::new()),
            log_path: None,
            warm: false,
        }
    }

    /// OS process id, if this handle owns a live child.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Whether at least one exchange has completed on this handle.
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.warm
    }

    pub(crate) fn mark_warm(&mut self) {
        self.warm = true;
    }

    /// Non-blocking liveness check. Stream-only handles never exit.
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            None | Some(Ok(None)) => false,
            Some(Ok(Some(status))) => {
                debug!(%status, "runner process already exited");
                true
            }
            Some(Err(err)) => {
                warn!(%err, "failed to poll runner process status");
                true
            }
        }
    }

    /// Write `line` followed by `\n` and flush.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Process`] if the runner's stdin is closed.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        self.stdin
            .write_all(&bytes)
            .await
            .map_err(|e| IntentError::Process(format!("failed to write to runner stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| IntentError::Process(format!("failed to flush runner stdin: {e}")))
    }

    /// Wait for the next line, channel failure, or process exit.
    ///
    /// Pending output is preferred over the exit notification so lines the
    /// runner wrote just before exiting are still delivered. Cancel-safe.
    pub async fn next_event(&mut self) -> ReadEvent {
        let Self { child, stdout, .. } = self;
        tokio::select! {
            biased;

            item = stdout.next() => match item {
                Some(Ok(line)) => ReadEvent::Line(line),
                Some(Err(err)) => ReadEvent::Broken(err),
                None => ReadEvent::Broken(IntentError::Process("runner stdout closed".into())),
            },

            status = wait_for_exit(child) => ReadEvent::Exited(describe_exit(status)),
        }
    }

    /// Kill the child, if any, and reap it.
    pub async fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(err) = child.kill().await {
                debug!(%err, "runner kill failed; process likely already gone");
            }
        }
        // Closing stdin unblocks in-memory peers that read until EOF.
        if let Err(err) = self.stdin.shutdown().await {
            debug!(%err, "runner stdin already closed");
        }
    }

    /// Last [`LOG_TAIL_BYTES`] of the runner's diagnostics log.
    #[must_use]
    pub fn log_tail(&self) -> Option<String> {
        self.log_path
            .as_deref()
            .and_then(|path| read_log_tail(path, LOG_TAIL_BYTES))
    }
}

async fn wait_for_exit(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

fn describe_exit(status: std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => status.code().map_or_else(
            || "runner process terminated by signal".to_owned(),
            |code| format!("runner process exited with code {code}"),
        ),
        Err(err) => format!("runner process wait failed: {err}"),
    }
}

/// Read at most `max_bytes` from the end of `path`.
///
/// Returns `None` when the file is missing, empty, or unreadable.
#[must_use]
pub fn read_log_tail(path: &Path, max_bytes: u64) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let size = file.metadata().ok()?.len();
    if size == 0 {
        return None;
    }
    let start = size.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start)).ok()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).ok()?;
    let tail = String::from_utf8_lossy(&data).into_owned();
    (!tail.trim().is_empty()).then_some(tail)
}
