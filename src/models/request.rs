//! Inference requests and the identities they carry.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Host-side identity of a simulated character.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SubjectId(pub u64);

impl Display for SubjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The character an utterance is addressed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    /// Stable host identity.
    pub id: SubjectId,
    /// Display name used in prompts and diagnostics.
    pub name: String,
}

impl Subject {
    /// Construct a subject from its identity and display name.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: SubjectId(id),
            name: name.into(),
        }
    }
}

/// Correlation id echoed back by the runner.
///
/// Ordinary ids have the form `req_<n>` and are handed out by a monotonic
/// counter, so they never collide with the reserved [`RequestId::SHUTDOWN`]
/// and [`RequestId::PREWARM`] values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Reserved id of the graceful shutdown sentinel.
    pub const SHUTDOWN: &'static str = "shutdown";
    /// Reserved id of the warm-up request.
    pub const PREWARM: &'static str = "prewarm";

    /// Id for the `counter`-th request.
    #[must_use]
    pub fn sequential(counter: u64) -> Self {
        Self(format!("req_{counter}"))
    }

    /// The shutdown sentinel id.
    #[must_use]
    pub fn shutdown() -> Self {
        Self(Self::SHUTDOWN.to_owned())
    }

    /// The warm-up request id.
    #[must_use]
    pub fn prewarm() -> Self {
        Self(Self::PREWARM.to_owned())
    }

    /// Whether this id belongs to the warm-up request.
    #[must_use]
    pub fn is_prewarm(&self) -> bool {
        self.0 == Self::PREWARM
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Optional sampling overrides forwarded to the runner.
///
/// Absent fields are omitted from the wire line and the runner falls back to
/// its own defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingParams {
    /// Softmax temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling mass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Repetition penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
}

/// One utterance packaged for the runner. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Addressed character.
    pub subject: Subject,
    /// Full prompt text.
    pub prompt: String,
    /// Situation snapshot the prompt was built from.
    pub snapshot: String,
    /// Generation token budget.
    pub max_tokens: u32,
    /// Sampling overrides.
    pub sampling: SamplingParams,
}
