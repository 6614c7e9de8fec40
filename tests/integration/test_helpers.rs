//! Shared test helpers for runner-level integration tests.
//!
//! Provides an in-memory runner peer driven by a script closure, a
//! [`Launcher`] that starts one peer per launch, and recording
//! implementations of the host-side traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use npc_intent::audit::{AuditEntry, AuditLogger};
use npc_intent::config::{IntentSettings, RunnerConfig};
use npc_intent::models::{Action, RequestId, Subject};
use npc_intent::protocol::RunnerRequest;
use npc_intent::runner::{Launcher, ProcessHandle};
use npc_intent::{ContextBuilder, DirectiveSink, IntentManager, Result};

/// What the peer does in answer to one request line.
#[derive(Debug, Clone, Default)]
pub struct PeerReply {
    /// Pause before writing anything.
    pub delay: Duration,
    /// Bytes written verbatim ahead of `lines`.
    pub preamble: Vec<u8>,
    /// Lines written to stdout, newline appended.
    pub lines: Vec<String>,
    /// Close stdout after writing, as a crashed runner would.
    pub close: bool,
}

impl PeerReply {
    pub fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn delayed(delay: Duration, lines: Vec<String>) -> Self {
        Self {
            delay,
            lines,
            ..Self::default()
        }
    }

    /// Raw bytes first, then `lines`.
    pub fn with_preamble(preamble: &[u8], lines: Vec<String>) -> Self {
        Self {
            preamble: preamble.to_vec(),
            lines,
            ..Self::default()
        }
    }

    pub fn crash() -> Self {
        Self {
            close: true,
            ..Self::default()
        }
    }
}

pub type Script = Arc<dyn Fn(&RunnerRequest) -> PeerReply + Send + Sync>;

/// JSON response line for `request_id`.
pub fn ok_line(request_id: &str, text: &str) -> String {
    serde_json::json!({ "request_id": request_id, "ok": true, "text": text }).to_string()
}

/// Failure response line for `request_id`.
pub fn error_line(request_id: &str, error: &str) -> String {
    serde_json::json!({ "request_id": request_id, "ok": false, "error": error }).to_string()
}

/// Script answering every request with `text`.
pub fn replying(text: &'static str) -> Script {
    Arc::new(move |req: &RunnerRequest| PeerReply::lines(vec![ok_line(&req.request_id, text)]))
}

/// Launcher starting one scripted in-memory peer per launch.
#[derive(Clone)]
pub struct ScriptedLauncher {
    script: Script,
    launches: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            launches: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of runners started so far, across clones.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Every request id any peer has read, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&mut self, _config: &RunnerConfig) -> Result<ProcessHandle> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (host, peer) = tokio::io::duplex(64 * 1024);
        tokio::spawn(run_peer(
            peer,
            Arc::clone(&self.script),
            Arc::clone(&self.received),
        ));
        let (reader, writer) = tokio::io::split(host);
        Ok(ProcessHandle::from_streams(reader, writer))
    }
}

async fn run_peer(stream: tokio::io::DuplexStream, script: Script, received: Arc<Mutex<Vec<String>>>) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = RunnerRequest::from_line(&line) else {
            continue;
        };
        received.lock().unwrap().push(request.request_id.clone());

        if request.is_shutdown() {
            let ack = r#"{"request_id":"shutdown","ok":true,"shutdown":true}"#;
            let _ = writer.write_all(format!("{ack}\n").as_bytes()).await;
            return;
        }

        let reply = script(&request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        if !reply.preamble.is_empty() && writer.write_all(&reply.preamble).await.is_err() {
            return;
        }
        for out in reply.lines {
            if writer.write_all(format!("{out}\n").as_bytes()).await.is_err() {
                return;
            }
        }
        if reply.close {
            return;
        }
    }
}

/// Settings for the local backend with a model directory, so the resolved
/// runner config validates.
pub fn local_settings() -> IntentSettings {
    let mut settings = IntentSettings::default();
    settings.runner.model_dir = Some("models/test".into());
    settings.cold_start_grace_ms = 0;
    settings.timeout_ms = 2_000;
    settings
}

pub fn local_config() -> RunnerConfig {
    RunnerConfig::resolve(&local_settings())
}

/// Context builder with predictable output.
pub struct TestContext;

impl ContextBuilder for TestContext {
    fn build_snapshot(&self, subject: &Subject, utterance: &str, request_id: &RequestId) -> String {
        format!("snapshot {} {utterance} {request_id}", subject.name)
    }

    fn build_prompt(&self, subject_name: &str, utterance: &str, snapshot: &str) -> String {
        format!("prompt {subject_name}: {utterance}\n{snapshot}")
    }
}

/// One call made on [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Say(String, String),
    Override {
        subject: String,
        actions: Vec<Action>,
        request_id: String,
        target: Option<String>,
    },
    Pickup(String, Vec<String>),
    Notify(String),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
}

impl RecordingSink {
    pub fn notifications(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SinkCall::Notify(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl DirectiveSink for RecordingSink {
    fn say(&mut self, subject: &Subject, speech: &str) {
        self.calls.push(SinkCall::Say(subject.name.clone(), speech.to_owned()));
    }

    fn set_behavior_override(
        &mut self,
        subject: &Subject,
        actions: &[Action],
        request_id: &RequestId,
        attack_target: Option<&str>,
    ) {
        self.calls.push(SinkCall::Override {
            subject: subject.name.clone(),
            actions: actions.to_vec(),
            request_id: request_id.to_string(),
            target: attack_target.map(str::to_owned),
        });
    }

    fn set_item_pickup_targets(&mut self, subject: &Subject, items: &[String]) {
        self.calls.push(SinkCall::Pickup(subject.name.clone(), items.to_vec()));
    }

    fn notify(&mut self, message: &str) {
        self.calls.push(SinkCall::Notify(message.to_owned()));
    }
}

/// Audit logger keeping entries in memory.
#[derive(Default)]
pub struct MemoryAudit {
    pub entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLogger for MemoryAudit {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Poll `process_responses` until it handles `expected` responses or five
/// seconds pass. Returns the number handled.
pub fn drain_until<L: Launcher + 'static>(
    manager: &mut IntentManager<L>,
    sink: &mut RecordingSink,
    expected: usize,
) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut handled = 0;
    while handled < expected && Instant::now() < deadline {
        handled += manager.process_responses(sink);
        std::thread::sleep(Duration::from_millis(10));
    }
    handled
}
