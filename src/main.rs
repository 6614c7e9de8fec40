#![forbid(unsafe_code)]

//! `intent-probe`: round-trips one utterance through a real runner.
//!
//! Loads an `intent.toml`, forces debug output on, queues the utterance, and
//! prints whatever directive comes back. Useful for checking a model
//! directory or API credentials without starting the host simulation.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use npc_intent::models::{Action, RequestId, Subject};
use npc_intent::{ContextBuilder, DirectiveSink, IntentError, IntentManager, IntentSettings, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "intent-probe", about = "Send one utterance to the intent runner", version, long_about = None)]
struct Cli {
    /// Path to the TOML settings file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Name of the character being addressed.
    #[arg(long, default_value = "Probe")]
    subject_name: String,

    /// How long to wait for the directive, cold start included.
    #[arg(long, default_value_t = 180)]
    wait_secs: u64,

    /// Warm the runner up before sending the utterance.
    #[arg(long)]
    prewarm: bool,

    /// What the player says.
    utterance: String,
}

struct ProbeContext;

impl ContextBuilder for ProbeContext {
    fn build_snapshot(&self, subject: &Subject, utterance: &str, request_id: &RequestId) -> String {
        json!({
            "request_id": request_id.as_str(),
            "npc": { "id": subject.id, "name": subject.name },
            "player_utterance": utterance,
        })
        .to_string()
    }

    fn build_prompt(&self, subject_name: &str, utterance: &str, snapshot: &str) -> String {
        let actions = Action::ALL.map(Action::as_str).join(", ");
        format!(
            "You are {subject_name}, a companion character.\n\
             Situation: {snapshot}\n\
             The player says: \"{utterance}\"\n\
             Reply on one line as: speech|action [action]|attack=<target>\n\
             Allowed actions: {actions}"
        )
    }
}

struct PrintSink;

impl DirectiveSink for PrintSink {
    fn say(&mut self, subject: &Subject, speech: &str) {
        println!("{}: {speech}", subject.name);
    }

    fn set_behavior_override(
        &mut self,
        _subject: &Subject,
        actions: &[Action],
        request_id: &RequestId,
        attack_target: Option<&str>,
    ) {
        let actions: Vec<&str> = actions.iter().copied().map(Action::as_str).collect();
        println!(
            "actions ({request_id}): {} target: {}",
            actions.join(" "),
            attack_target.unwrap_or("-")
        );
    }

    fn set_item_pickup_targets(&mut self, _subject: &Subject, items: &[String]) {
        println!("pickup: {}", items.join(", "));
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let mut settings = IntentSettings::load_from_path(&args.config)?;
    settings.enabled = true;
    settings.debug = true;
    bound_exchange_time(&mut settings, Duration::from_secs(args.wait_secs));
    info!(config = %args.config.display(), "settings loaded");

    let mut manager = IntentManager::new(settings);
    let context = ProbeContext;
    if args.prewarm {
        manager.prewarm(&context);
    }

    let subject = Subject::new(1, args.subject_name);
    let request_id = manager
        .enqueue_request(&subject, &args.utterance, &context)
        .ok_or_else(|| IntentError::Config("intent broker could not start".into()))?;
    info!(%request_id, "utterance queued");

    let deadline = Instant::now() + Duration::from_secs(args.wait_secs);
    let mut sink = PrintSink;
    while manager.process_responses(&mut sink) == 0 {
        if Instant::now() >= deadline {
            return Err(IntentError::Protocol(format!(
                "no response within {}s",
                args.wait_secs
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }

    manager.shutdown();
    Ok(())
}

/// Cap the runner timeout and cold-start grace at `wait`, so dropping the
/// manager after the deadline never joins a worker stuck in a longer exchange.
/// With `--prewarm` two exchanges run back to back, each capped separately.
fn bound_exchange_time(settings: &mut IntentSettings, wait: Duration) {
    let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX).max(1);
    if settings.timeout_ms == 0 || settings.timeout_ms > wait_ms {
        settings.timeout_ms = wait_ms;
    }
    settings.cold_start_grace_ms = settings.cold_start_grace_ms.min(wait_ms);
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| IntentError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| IntentError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
