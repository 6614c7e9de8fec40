//! Append-only audit trail of intent exchanges.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`RotatingAuditWriter`], appends one JSON object per line
//! and rotates the file into numbered siblings once it grows past a size
//! threshold.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Request, RequestId, Response, Subject};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Context snapshot built for a request.
    Snapshot,
    /// Prompt sent to the runner.
    Prompt,
    /// Reply that decoded into a directive.
    Response,
    /// Runner failure or undecodable reply.
    Failure,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Request the event belongs to.
    pub request_id: RequestId,
    /// Character the request was about.
    pub subject: Subject,
    /// Snapshot, prompt, or raw runner payload.
    #[serde(default)]
    pub payload: String,
    /// Failure description, for `failure` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Parser warnings, for `response` events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AuditEntry {
    /// Construct an entry with an empty payload.
    #[must_use]
    pub fn new(event_type: AuditEventType, request_id: RequestId, subject: Subject) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            request_id,
            subject,
            payload: String::new(),
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Entry describing the snapshot of `request`.
    #[must_use]
    pub fn snapshot(request: &Request) -> Self {
        Self::new(AuditEventType::Snapshot, request.id.clone(), request.subject.clone())
            .with_payload(request.snapshot.clone())
    }

    /// Entry describing the prompt of `request`.
    #[must_use]
    pub fn prompt(request: &Request) -> Self {
        Self::new(AuditEventType::Prompt, request.id.clone(), request.subject.clone())
            .with_payload(request.prompt.clone())
    }

    /// Entry for a response; `failure` of `None` means it decoded.
    #[must_use]
    pub fn for_response(response: &Response, failure: Option<String>) -> Self {
        let event_type = if failure.is_some() {
            AuditEventType::Failure
        } else {
            AuditEventType::Response
        };
        let mut entry = Self::new(event_type, response.request_id.clone(), response.subject.clone())
            .with_payload(response.payload().to_owned());
        entry.error = failure;
        entry
    }

    /// Set the payload text.
    #[must_use]
    pub fn with_payload(mut self, payload: String) -> Self {
        self.payload = payload;
        self
    }

    /// Set parser warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] so a manager can share one
/// through [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::RotatingAuditWriter;
