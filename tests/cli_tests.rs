//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

use std::net::TcpListener;

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the taskorchard-worker binary
fn worker_cmd() -> Command {
    let mut cmd = Command::cargo_bin("taskorchard-worker").unwrap();
    cmd.env_remove("TASKORCHARD_SERVER_URL")
        .env_remove("TASKORCHARD_GROUP")
        .env_remove("TASKORCHARD_CONFIG");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    worker_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("TaskOrchard Worker"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    worker_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("taskorchard-worker"))
        .stdout(predicate::str::contains("Git Hash"))
        .stdout(predicate::str::contains("Target"));
}

#[test]
fn test_short_version_flag() {
    worker_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("taskorchard-worker"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    worker_cmd()
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("[worker]"))
        .stdout(predicate::str::contains("[executor]"))
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("server_url = \"ws://localhost:3000/ws\""));
}

#[test]
fn test_config_validate_default() {
    worker_cmd()
        .arg("config")
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    worker_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_init_help() {
    worker_cmd()
        .arg("config")
        .arg("init")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialize"))
        .stdout(predicate::str::contains("--path"))
        .stdout(predicate::str::contains("--force"));
}

// ─────────────────────────────────────────────────────────────────
// Run Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_help() {
    worker_cmd()
        .arg("run")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run the worker"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--server-url"))
        .stdout(predicate::str::contains("--group"));
}

#[test]
fn test_run_with_missing_config() {
    worker_cmd()
        .arg("run")
        .arg("--config")
        .arg("/nonexistent/config.toml")
        .assert()
        .failure();
}

#[test]
fn test_run_rejects_non_websocket_url() {
    worker_cmd()
        .arg("run")
        .arg("--server-url")
        .arg("http://localhost:3000")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ws://"));
}

#[test]
fn test_run_rejects_unknown_handler() {
    worker_cmd()
        .arg("run")
        .env("TASKORCHARD_HANDLER", "llama")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown handler 'llama'"));
}

#[test]
fn test_run_keeps_retrying_unreachable_server() {
    // Grab a free port, then release it so nothing listens there
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let output = worker_cmd()
        .arg("run")
        .arg("--server-url")
        .arg(format!("ws://127.0.0.1:{}/ws", port))
        .env("TASKORCHARD_RECONNECT_INTERVAL", "1")
        .timeout(std::time::Duration::from_secs(3))
        .output()
        .unwrap();

    // Killed by the timeout rather than exiting on its own
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Waiting before reconnection"), "stdout: {}", stdout);
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    worker_cmd().arg("-v").arg("version").assert().success();
}

#[test]
fn test_quiet_flag() {
    worker_cmd().arg("--quiet").arg("version").assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    worker_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    worker_cmd().assert().failure();
}
