//! Integration tests for the per-request worker step.
//!
//! `handle_request` must always produce exactly one response carrying the
//! request's id, and must leave the supervisor stopped after any failure.

use std::sync::Arc;
use std::time::Duration;

use npc_intent::models::{Request, RequestId, SamplingParams, Subject};
use npc_intent::protocol::RunnerRequest;
use npc_intent::runner::{RunnerState, Supervisor};
use npc_intent::worker::handle_request;
use npc_intent::IntentSettings;

use super::test_helpers::{local_settings, replying, PeerReply, ScriptedLauncher};

fn request(n: u64) -> Request {
    Request {
        id: RequestId::sequential(n),
        subject: Subject::new(9, "Rook"),
        prompt: "prompt".into(),
        snapshot: "snapshot".into(),
        max_tokens: 16,
        sampling: SamplingParams::default(),
    }
}

#[tokio::test]
async fn successful_exchange_keeps_runner_warm() {
    let launcher = ScriptedLauncher::new(replying("On it.|wait_here"));
    let mut sup = Supervisor::new(launcher.clone());

    let response = handle_request(&mut sup, &local_settings(), &request(1)).await;

    assert!(response.ok, "error: {}", response.error);
    assert_eq!(response.request_id.as_str(), "req_1");
    assert_eq!(response.text, "On it.|wait_here");
    assert_eq!(sup.state(), RunnerState::Warm);

    let again = handle_request(&mut sup, &local_settings(), &request(2)).await;
    assert!(again.ok);
    assert_eq!(launcher.launches(), 1, "runner is reused while config is unchanged");
}

#[tokio::test]
async fn config_error_becomes_failure_response() {
    let launcher = ScriptedLauncher::new(replying("unused|idle"));
    let mut sup = Supervisor::new(launcher.clone());

    let response = handle_request(&mut sup, &IntentSettings::default(), &request(1)).await;

    assert!(!response.ok);
    assert_eq!(response.request_id.as_str(), "req_1");
    assert!(response.error.starts_with("config:"), "got {}", response.error);
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn timeout_terminates_runner_and_next_request_respawns() {
    let launcher = ScriptedLauncher::new(Arc::new(|req: &RunnerRequest| {
        if req.request_id == "req_1" {
            PeerReply::silent()
        } else {
            PeerReply::lines(vec![super::test_helpers::ok_line(
                &req.request_id,
                "Back.|idle",
            )])
        }
    }));
    let mut sup = Supervisor::new(launcher.clone());
    let mut settings = local_settings();
    settings.timeout_ms = 50;

    let failed = handle_request(&mut sup, &settings, &request(1)).await;
    assert!(!failed.ok);
    assert!(failed.error.contains("timed out"), "got {}", failed.error);
    assert_eq!(sup.state(), RunnerState::Stopped);

    let recovered = handle_request(&mut sup, &settings, &request(2)).await;
    assert!(recovered.ok, "error: {}", recovered.error);
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn cold_start_grace_comes_from_settings() {
    let launcher = ScriptedLauncher::new(Arc::new(|req: &RunnerRequest| {
        PeerReply::delayed(
            Duration::from_millis(120),
            vec![super::test_helpers::ok_line(&req.request_id, "Yawn.|idle")],
        )
    }));
    let mut sup = Supervisor::new(launcher);
    let mut settings = local_settings();
    settings.timeout_ms = 20;
    settings.cold_start_grace_ms = 2_000;

    let response = handle_request(&mut sup, &settings, &request(1)).await;
    assert!(response.ok, "error: {}", response.error);
}

#[tokio::test]
async fn crashed_runner_is_terminated_before_next_request() {
    let launcher = ScriptedLauncher::new(Arc::new(|req: &RunnerRequest| {
        if req.request_id == "req_1" {
            PeerReply::crash()
        } else {
            PeerReply::lines(vec![super::test_helpers::ok_line(&req.request_id, "Up.|idle")])
        }
    }));
    let mut sup = Supervisor::new(launcher.clone());

    let failed = handle_request(&mut sup, &local_settings(), &request(1)).await;
    assert!(!failed.ok);
    assert!(failed.error.starts_with("process:"), "got {}", failed.error);
    assert_eq!(sup.state(), RunnerState::Stopped);

    let recovered = handle_request(&mut sup, &local_settings(), &request(2)).await;
    assert!(recovered.ok, "error: {}", recovered.error);
    assert_eq!(launcher.launches(), 2);
}
