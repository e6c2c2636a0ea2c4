//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_studyplan"))
        .args(args)
        .env("STUDYPLAN_DATA_DIR", data_dir)
        .env("STUDYPLAN_REPORTER_TOKEN", "test-token")
        .env("STUDYPLAN_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn write_plan(dir: &Path, body: &str) -> String {
    let path = dir.join("plan.json");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

const PLAN: &str = r#"{
    "id": "essay",
    "scheduledDuration": 1500,
    "tasksPlanned": [
        { "id": "outline", "title": "Outline", "estimatedTime": 10 },
        { "id": "draft", "title": "Draft", "estimatedTime": 15, "userEstimate": 12 }
    ]
}"#;

fn started(dir: &TempDir) {
    let plan = write_plan(dir.path(), PLAN);
    let (code, stdout, stderr) = run_cli(dir.path(), &["session", "start", "--plan", &plan]);
    assert_eq!(code, 0, "session start failed: {stderr}");
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "session_started");
}

fn status_json(dir: &TempDir) -> Value {
    let (code, stdout, stderr) = run_cli(dir.path(), &["session", "status", "--json"]);
    assert_eq!(code, 0, "session status failed: {stderr}");
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_start_and_status() {
    let dir = TempDir::new().unwrap();
    started(&dir);

    let status = status_json(&dir);
    assert_eq!(status["type"], "state_snapshot");
    assert_eq!(status["phase"], "paused");
    assert_eq!(status["session_id"], "essay");
    assert_eq!(status["remaining_seconds"], 1500);
    assert_eq!(status["current_task"], "Outline");

    let (code, stdout, _) = run_cli(dir.path(), &["session", "status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("25:00 of 25:00"), "unexpected status: {stdout}");
}

#[test]
fn test_plan_without_id_gets_one() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"{ "scheduledDuration": 600, "tasksPlanned": [] }"#,
    );
    let (code, stdout, _) = run_cli(dir.path(), &["session", "start", "--plan", &plan]);
    assert_eq!(code, 0);
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert!(!event["session_id"].as_str().unwrap().is_empty());
}

#[test]
fn test_second_start_is_rejected() {
    let dir = TempDir::new().unwrap();
    started(&dir);
    let plan = write_plan(dir.path(), PLAN);
    let (code, _, stderr) = run_cli(dir.path(), &["session", "start", "--plan", &plan]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error: Cannot start session"), "{stderr}");
}

#[test]
fn test_invalid_plan_is_rejected() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"{ "id": "dup", "scheduledDuration": 600, "tasksPlanned": [
            { "id": "a", "title": "One", "estimatedTime": 5 },
            { "id": "a", "title": "Two", "estimatedTime": 5 }
        ] }"#,
    );
    let (code, _, stderr) = run_cli(dir.path(), &["session", "start", "--plan", &plan]);
    assert_eq!(code, 1);
    assert!(stderr.starts_with("error:"), "{stderr}");

    let status = status_json(&dir);
    assert_eq!(status["phase"], "idle");
}

#[test]
fn test_complete_then_skip_advances_cursor() {
    let dir = TempDir::new().unwrap();
    started(&dir);

    let (code, stdout, _) = run_cli(dir.path(), &["session", "complete"]);
    assert_eq!(code, 0);
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "task_completed");
    assert_eq!(event["task_cursor"], 1);
    assert_eq!(event["all_tasks_done"], false);

    let (code, stdout, _) = run_cli(dir.path(), &["session", "skip"]);
    assert_eq!(code, 0);
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "task_skipped");
    assert_eq!(event["all_tasks_done"], true);

    let status = status_json(&dir);
    assert_eq!(status["task_cursor"], 2);
    assert_eq!(status["completed"], 1);
    assert_eq!(status["phase"], "paused");

    let (code, _, stderr) = run_cli(dir.path(), &["session", "skip"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error: Cannot skip task"), "{stderr}");
}

#[test]
fn test_cancel_clears_session() {
    let dir = TempDir::new().unwrap();
    started(&dir);
    let _ = run_cli(dir.path(), &["session", "complete"]);

    let (code, stdout, _) = run_cli(dir.path(), &["session", "cancel"]);
    assert_eq!(code, 0);
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "session_cancelled");
    assert_eq!(event["discarded_completions"], 1);

    let (code, stdout, _) = run_cli(dir.path(), &["session", "status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("no active session"));
}

#[test]
fn test_finalize_failure_keeps_session() {
    let dir = TempDir::new().unwrap();
    // Nothing listens on the discard port.
    let (code, _, _) = run_cli(
        dir.path(),
        &["config", "set", "reporter.base_url", "http://127.0.0.1:9/api"],
    );
    assert_eq!(code, 0);
    let _ = run_cli(dir.path(), &["config", "set", "reporter.timeout_secs", "2"]);

    started(&dir);
    let _ = run_cli(dir.path(), &["session", "complete"]);

    let (code, _, stderr) = run_cli(dir.path(), &["session", "finalize"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");

    let status = status_json(&dir);
    assert_eq!(status["session_id"], "essay");
    assert_eq!(status["completed"], 1);
}

#[test]
fn test_config_set_and_get() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "session.tick_interval_ms"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1000");

    let (code, _, _) = run_cli(dir.path(), &["config", "set", "session.tick_interval_ms", "250"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "session.tick_interval_ms"]);
    assert_eq!(stdout.trim(), "250");

    let (code, stdout, _) = run_cli(dir.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("reporter.base_url = "));
}

#[test]
fn test_config_unknown_key() {
    let dir = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "session.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"), "{stderr}");
}

#[test]
fn test_help_leaves_data_dir_untouched() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let output = Command::new(env!("CARGO_BIN_EXE_studyplan"))
        .arg("--help")
        .env("STUDYPLAN_DATA_DIR", &data_dir)
        .env_remove("STUDYPLAN_LOG")
        .output()
        .expect("Failed to execute CLI command");
    assert!(output.status.success());
    assert!(!data_dir.exists());
}

#[test]
fn test_live_run_status_complete_and_quit() {
    let dir = TempDir::new().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["config", "set", "session.tick_interval_ms", "10"]);
    assert_eq!(code, 0);
    started(&dir);

    let mut child = Command::new(env!("CARGO_BIN_EXE_studyplan"))
        .args(["session", "run"])
        .env("STUDYPLAN_DATA_DIR", dir.path())
        .env("STUDYPLAN_REPORTER_TOKEN", "test-token")
        .env("STUDYPLAN_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"?\n").unwrap();
    stdin.flush().unwrap();
    // Let the 10ms clock count some budget down.
    sleep(Duration::from_millis(300));
    stdin.write_all(b"c\nq\n").unwrap();
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "session run failed: {stderr}");
    assert!(stdout.contains(r#""type": "state_snapshot""#), "{stdout}");
    assert!(stdout.contains(r#""type": "task_completed""#), "{stdout}");

    let status = status_json(&dir);
    assert_eq!(status["phase"], "paused");
    assert_eq!(status["task_cursor"], 1);
    let remaining = status["remaining_seconds"].as_u64().unwrap();
    assert!(remaining < 1500, "no ticks counted: {remaining}");
}
