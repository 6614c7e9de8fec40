//! Error types shared across the intent broker.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, IntentError>;

/// Error enumeration covering every failure mode of the broker.
///
/// Config and process errors abort only the request being handled; the
/// worker turns them into a failure response and keeps running. Protocol
/// errors additionally poison the runner process, which is killed before the
/// next exchange. Parse errors never leave the manager.
#[derive(Debug)]
pub enum IntentError {
    /// Settings parsing or runner configuration validation failure.
    Config(String),
    /// Runner process spawn, pipe, write, or unexpected-exit failure.
    Process(String),
    /// Timeout awaiting a matching line, or an accepted line that is malformed.
    Protocol(String),
    /// Model output from which not even speech could be recovered.
    Parse(String),
    /// File-system or I/O operation failure outside the runner pipes.
    Io(String),
}

impl IntentError {
    /// Whether this failure leaves the runner process in an unknown state.
    ///
    /// A poisoned runner must be terminated and never reused.
    #[must_use]
    pub fn poisons_runner(&self) -> bool {
        matches!(self, Self::Process(_) | Self::Protocol(_))
    }
}

impl Display for IntentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for IntentError {}

impl From<toml::de::Error> for IntentError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid settings: {err}"))
    }
}

impl From<std::io::Error> for IntentError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
