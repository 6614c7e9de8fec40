//! Runner subprocess supervision.
//!
//! - `launcher`: starts a runner for a [`RunnerConfig`](crate::config::RunnerConfig),
//!   either as a real child process or, in tests, as an in-memory peer.
//! - `process`: [`ProcessHandle`], the duplex line channel to one runner.
//! - `supervisor`: [`Supervisor`], which keeps at most one runner alive and
//!   drives request/response exchanges over it.

pub mod launcher;
pub mod process;
pub mod supervisor;

pub use launcher::{CommandLauncher, Launcher};
pub use process::{ProcessHandle, ReadEvent};
pub use supervisor::{RunnerState, Supervisor, DEFAULT_COLD_START_GRACE, SHUTDOWN_GRACE};
