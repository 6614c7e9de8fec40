//! Host-facing façade over the queue, the worker, and the parser.
//!
//! The host owns one [`IntentManager`] and calls it from its tick loop:
//! [`enqueue_request`](IntentManager::enqueue_request) when a character is
//! addressed, [`process_responses`](IntentManager::process_responses) once
//! per tick. Neither call waits on inference.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLogger, RotatingAuditWriter};
use crate::config::{IntentSettings, SharedSettings};
use crate::models::{Action, Request, RequestId, Response, Subject};
use crate::parser::{decode_directive, DecodedDirective};
use crate::queue::RequestQueue;
use crate::runner::{CommandLauncher, Launcher};
use crate::worker::spawn_worker;

/// Token budget of the warm-up request.
pub const PREWARM_MAX_TOKENS: u32 = 8;

/// Builds the text sent to the model. Runs on the host thread.
pub trait ContextBuilder {
    /// Describe the world as `subject` sees it.
    fn build_snapshot(&self, subject: &Subject, utterance: &str, request_id: &RequestId) -> String;

    /// Compose the full prompt from the snapshot.
    fn build_prompt(&self, subject_name: &str, utterance: &str, snapshot: &str) -> String;
}

/// Applies decoded directives to the simulation.
pub trait DirectiveSink {
    /// Make `subject` speak.
    fn say(&mut self, subject: &Subject, speech: &str);

    /// Replace the behavior of `subject`.
    fn set_behavior_override(
        &mut self,
        subject: &Subject,
        actions: &[Action],
        request_id: &RequestId,
        attack_target: Option<&str>,
    );

    /// Items `subject` should pick up.
    fn set_item_pickup_targets(&mut self, _subject: &Subject, _items: &[String]) {}

    /// Debug message for the player.
    fn notify(&mut self, _message: &str) {}
}

/// Owns the worker thread and turns responses into directives.
pub struct IntentManager<L: Launcher + 'static = CommandLauncher> {
    queue: Arc<RequestQueue>,
    settings: SharedSettings,
    launcher: Option<L>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
    prewarm_enqueued: bool,
    injected_audit: Option<Arc<dyn AuditLogger>>,
    file_audit: Option<(PathBuf, Arc<dyn AuditLogger>)>,
}

impl IntentManager<CommandLauncher> {
    /// Manager that launches real runner subprocesses.
    #[must_use]
    pub fn new(settings: IntentSettings) -> Self {
        Self::with_launcher(settings, CommandLauncher)
    }
}

impl<L: Launcher + 'static> IntentManager<L> {
    /// Manager that starts runners through `launcher`.
    #[must_use]
    pub fn with_launcher(settings: IntentSettings, launcher: L) -> Self {
        Self {
            queue: Arc::new(RequestQueue::new()),
            settings: SharedSettings::new(settings),
            launcher: Some(launcher),
            worker: None,
            next_id: 0,
            prewarm_enqueued: false,
            injected_audit: None,
            file_audit: None,
        }
    }

    /// Send audit entries to `logger` instead of the file named in settings.
    ///
    /// `audit.enabled` still decides whether anything is written.
    #[must_use]
    pub fn with_audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.injected_audit = Some(logger);
        self
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> IntentSettings {
        self.settings.snapshot()
    }

    /// Replace the settings. The worker picks them up on its next request,
    /// restarting the runner if its configuration changed.
    pub fn update_settings(&self, settings: IntentSettings) {
        self.settings.replace(settings);
    }

    /// Whether the worker thread has been started and not yet joined.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Requests waiting for the worker.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.queue.pending_len()
    }

    /// Queue an utterance addressed to `subject`.
    ///
    /// Returns `None` without doing anything when the broker is disabled or
    /// the worker cannot be started.
    pub fn enqueue_request(
        &mut self,
        subject: &Subject,
        utterance: &str,
        context: &dyn ContextBuilder,
    ) -> Option<RequestId> {
        let settings = self.settings.snapshot();
        if !settings.enabled || !self.ensure_worker() {
            return None;
        }

        self.next_id += 1;
        let id = RequestId::sequential(self.next_id);
        let snapshot = context.build_snapshot(subject, utterance, &id);
        let prompt = context.build_prompt(&subject.name, utterance, &snapshot);
        let request = Request {
            id: id.clone(),
            subject: subject.clone(),
            prompt,
            snapshot,
            max_tokens: settings.max_tokens,
            sampling: settings.sampling,
        };

        if let Some(audit) = self.audit_logger(&settings) {
            record(&*audit, AuditEntry::snapshot(&request));
            record(&*audit, AuditEntry::prompt(&request));
        }

        debug!(request_id = %id, subject = %subject.id, "intent request queued");
        self.queue.push_request(request);
        Some(id)
    }

    /// Start the worker and queue one small warm-up request so the runner's
    /// cold start happens before the first real utterance.
    ///
    /// Effective at most once per manager. Returns whether a request was queued.
    pub fn prewarm(&mut self, context: &dyn ContextBuilder) -> bool {
        let settings = self.settings.snapshot();
        if !settings.enabled || self.prewarm_enqueued || !self.ensure_worker() {
            return false;
        }
        self.prewarm_enqueued = true;

        let id = RequestId::prewarm();
        let snapshot = "{}".to_owned();
        let prompt = context.build_prompt("", "", &snapshot);
        self.queue.push_request(Request {
            id,
            subject: Subject::new(0, RequestId::PREWARM),
            prompt,
            snapshot,
            max_tokens: PREWARM_MAX_TOKENS,
            sampling: settings.sampling,
        });
        info!("intent runner prewarm queued");
        true
    }

    /// Dispatch every finished response to `sink`.
    ///
    /// Returns the number of responses handled, not counting the warm-up.
    pub fn process_responses(&mut self, sink: &mut dyn DirectiveSink) -> usize {
        let responses = self.queue.drain_responses();
        if responses.is_empty() {
            return 0;
        }

        let settings = self.settings.snapshot();
        let audit = self.audit_logger(&settings);
        let mut handled = 0;

        for response in responses {
            if response.request_id.is_prewarm() {
                debug!(ok = response.ok, "prewarm response dropped");
                continue;
            }
            handled += 1;

            match decode_response(&response) {
                Ok(decoded) => {
                    apply(sink, &response, &decoded);
                    if settings.debug {
                        let name = &response.subject.name;
                        sink.notify(&format!("intent response for {name}: {}", response.text));
                        for warning in &decoded.warnings {
                            sink.notify(&format!("intent warning for {name}: {warning}"));
                        }
                        info!(
                            request_id = %response.request_id,
                            subject = %response.subject.id,
                            stage = ?decoded.stage,
                            "intent directive applied"
                        );
                    }
                    if let Some(audit) = &audit {
                        record(
                            &**audit,
                            AuditEntry::for_response(&response, None).with_warnings(decoded.warnings),
                        );
                    }
                }
                Err(reason) => {
                    if settings.debug {
                        let name = &response.subject.name;
                        sink.notify(&format!("intent failed for {name}: {reason}"));
                        warn!(
                            request_id = %response.request_id,
                            subject = %response.subject.id,
                            %reason,
                            "intent request failed"
                        );
                    }
                    if let Some(audit) = &audit {
                        record(&**audit, AuditEntry::for_response(&response, Some(reason)));
                    }
                }
            }
        }

        handled
    }

    /// Stop the worker and join it. Requests it has not started are dropped.
    ///
    /// The manager cannot be restarted afterwards.
    pub fn shutdown(&mut self) {
        self.queue.request_stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("intent worker panicked");
            }
        }
        let abandoned = self.queue.take_pending().len();
        if abandoned > 0 {
            debug!(abandoned, "pending intent requests dropped");
        }
    }

    fn ensure_worker(&mut self) -> bool {
        if self.worker.is_some() {
            return true;
        }
        let Some(launcher) = self.launcher.take() else {
            return false;
        };
        match spawn_worker(Arc::clone(&self.queue), self.settings.clone(), launcher) {
            Ok(handle) => {
                self.worker = Some(handle);
                true
            }
            Err(err) => {
                warn!(%err, "failed to start intent worker");
                false
            }
        }
    }

    fn audit_logger(&mut self, settings: &IntentSettings) -> Option<Arc<dyn AuditLogger>> {
        if !settings.audit.enabled {
            return None;
        }
        if let Some(injected) = &self.injected_audit {
            return Some(Arc::clone(injected));
        }

        let path = settings.audit_path();
        if let Some((open_path, writer)) = &self.file_audit {
            if *open_path == path {
                return Some(Arc::clone(writer));
            }
        }

        match RotatingAuditWriter::new(path.clone(), settings.audit.max_bytes, settings.audit.keep) {
            Ok(writer) => {
                let writer: Arc<dyn AuditLogger> = Arc::new(writer);
                self.file_audit = Some((path, Arc::clone(&writer)));
                Some(writer)
            }
            Err(err) => {
                warn!(%err, "audit log unavailable");
                None
            }
        }
    }
}

impl<L: Launcher + 'static> Drop for IntentManager<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn decode_response(response: &Response) -> Result<DecodedDirective, String> {
    if !response.ok {
        return Err(response.error.clone());
    }
    decode_directive(&response.text).map_err(|failure| failure.to_string())
}

fn apply(sink: &mut dyn DirectiveSink, response: &Response, decoded: &DecodedDirective) {
    let subject = &response.subject;
    let directive = &decoded.directive;

    sink.say(subject, &directive.speech);
    sink.set_behavior_override(
        subject,
        &directive.actions,
        &response.request_id,
        directive.attack_target.as_deref(),
    );
    if !directive.pickup_targets.is_empty() {
        sink.set_item_pickup_targets(subject, &directive.pickup_targets);
    }
}

fn record(logger: &dyn AuditLogger, entry: AuditEntry) {
    if let Err(err) = logger.log_entry(entry) {
        warn!(%err, "failed to append audit entry");
    }
}
