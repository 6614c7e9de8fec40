//! Unit tests for runner helpers that need no child process.

use std::time::Duration;

use npc_intent::runner::process::read_log_tail;
use npc_intent::runner::supervisor::effective_timeout;

const GRACE: Duration = Duration::from_secs(120);

#[test]
fn cold_runner_timeout_is_raised_to_grace() {
    assert_eq!(effective_timeout(Some(Duration::from_secs(30)), false, GRACE), Some(GRACE));
}

#[test]
fn cold_runner_keeps_longer_timeout() {
    let long = Duration::from_secs(300);
    assert_eq!(effective_timeout(Some(long), false, GRACE), Some(long));
}

#[test]
fn warm_runner_uses_caller_timeout() {
    let t = Duration::from_millis(500);
    assert_eq!(effective_timeout(Some(t), true, GRACE), Some(t));
}

#[test]
fn unbounded_stays_unbounded() {
    assert_eq!(effective_timeout(None, false, GRACE), None);
    assert_eq!(effective_timeout(None, true, GRACE), None);
}

#[test]
fn log_tail_returns_last_bytes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("runner.log");
    std::fs::write(&path, format!("{}END", "a".repeat(5000))).expect("write");

    let tail = read_log_tail(&path, 10).expect("tail");
    assert_eq!(tail, "aaaaaaaEND");
}

#[test]
fn log_tail_of_missing_or_blank_file_is_none() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(read_log_tail(&temp.path().join("absent.log"), 4096), None);

    let blank = temp.path().join("blank.log");
    std::fs::write(&blank, "\n\n").expect("write");
    assert_eq!(read_log_tail(&blank, 4096), None);
}
