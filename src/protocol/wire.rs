//! Request encoding and response-line decoding.
//!
//! The runner shares its stdout with whatever the inference libraries print,
//! so decoding is deliberately forgiving: blank lines, non-JSON text, and
//! JSON objects answering some other request are all reported as "skip"
//! (`Ok(None)`). Only a line that carries the expected id but cannot be read
//! as a response is an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Request, RequestId, SamplingParams};
use crate::{IntentError, Result};

/// Graceful shutdown sentinel, written without its trailing newline.
pub const SHUTDOWN_LINE: &str = r#"{"command":"shutdown","request_id":"shutdown"}"#;

/// Outbound request line.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    request_id: &'a str,
    prompt: &'a str,
    snapshot: &'a str,
    max_tokens: u32,
    #[serde(flatten)]
    sampling: &'a SamplingParams,
}

/// Encode `request` as a single JSON line (without the newline).
///
/// # Errors
///
/// Returns [`IntentError::Protocol`] if serialization fails.
pub fn encode_request(request: &Request) -> Result<String> {
    let wire = WireRequest {
        request_id: request.id.as_str(),
        prompt: &request.prompt,
        snapshot: &request.snapshot,
        max_tokens: request.max_tokens,
        sampling: &request.sampling,
    };
    serde_json::to_string(&wire)
        .map_err(|e| IntentError::Protocol(format!("failed to encode request: {e}")))
}

/// A request line as seen from the runner's side of the pipe.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunnerRequest {
    /// Correlation id to echo back.
    pub request_id: String,
    /// `shutdown` for the sentinel, absent otherwise.
    #[serde(default)]
    pub command: Option<String>,
    /// Prompt text.
    #[serde(default)]
    pub prompt: String,
    /// Situation snapshot.
    #[serde(default)]
    pub snapshot: String,
    /// Token budget.
    #[serde(default)]
    pub max_tokens: u32,
    /// Sampling overrides.
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

impl RunnerRequest {
    /// Parse one request line.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Protocol`] when the line is not a request object.
    pub fn from_line(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| IntentError::Protocol(format!("malformed request line: {e}")))
    }

    /// Whether this is the graceful shutdown sentinel.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.command.as_deref() == Some("shutdown")
    }
}

/// Decoded fields of an accepted response line.
///
/// Missing `ok` reads as `false`; missing `text` and `error` as empty.
/// Extra fields such as `metrics` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireResponse {
    /// Echoed correlation id.
    pub request_id: String,
    /// Runner success flag.
    #[serde(default)]
    pub ok: bool,
    /// Generated text.
    #[serde(default)]
    pub text: String,
    /// Runner-side error description.
    #[serde(default)]
    pub error: String,
}

/// Why a line with the expected id could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The id matched but the remaining fields have the wrong shape.
    Malformed(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed response line: {msg}"),
        }
    }
}

impl From<DecodeError> for IntentError {
    fn from(err: DecodeError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Decode one stdout line while waiting for `expected`.
///
/// # Return value
///
/// - `Ok(Some(response))`: the line answers `expected`.
/// - `Ok(None)`: blank, non-JSON, or addressed to another id; skip it.
/// - `Err(DecodeError::Malformed)`: the id matched but the line is unusable.
///
/// # Errors
///
/// See above; never panics on arbitrary input.
pub fn decode_line(
    line: &str,
    expected: &RequestId,
) -> std::result::Result<Option<WireResponse>, DecodeError> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        if !trimmed.is_empty() {
            debug!(line = trimmed, "runner noise: not a json object");
        }
        return Ok(None);
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        debug!(line = trimmed, "runner noise: invalid json");
        return Ok(None);
    };

    let id = value.get("request_id").and_then(serde_json::Value::as_str);
    if id != Some(expected.as_str()) {
        debug!(
            expected = expected.as_str(),
            got = id.unwrap_or(""),
            "runner noise: request id mismatch"
        );
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| DecodeError::Malformed(e.to_string()))
}
