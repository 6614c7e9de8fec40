//! Runner responses, including synthesized failures.

use crate::models::request::{Request, RequestId, Subject};
use crate::IntentError;

/// Outcome of exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Id of the originating request.
    pub request_id: RequestId,
    /// Subject of the originating request.
    pub subject: Subject,
    /// Whether the runner reported success.
    pub ok: bool,
    /// Generated text.
    pub text: String,
    /// Error reported by the runner or synthesized locally.
    pub error: String,
    /// Raw accepted line; empty for synthesized failures.
    pub raw: String,
}

impl Response {
    /// Synthesize a failure response for `request`.
    #[must_use]
    pub fn failure(request: &Request, err: &IntentError) -> Self {
        Self {
            request_id: request.id.clone(),
            subject: request.subject.clone(),
            ok: false,
            text: String::new(),
            error: err.to_string(),
            raw: String::new(),
        }
    }

    /// Raw line when present, generated text otherwise.
    #[must_use]
    pub fn payload(&self) -> &str {
        if self.raw.is_empty() {
            &self.text
        } else {
            &self.raw
        }
    }
}
