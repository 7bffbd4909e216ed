#![cfg(unix)]

use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use std::path::Path;
use tempfile::{TempDir, tempdir};

/// A `retrier` command isolated from the user's config and environment.
fn retrier(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("retrier"));
    cmd.env("XDG_CONFIG_HOME", home.path())
        .env("HOME", home.path())
        .env_remove("RETRIER_CONFIG")
        .env_remove("RETRIER_ATTEMPTS")
        .env_remove("RETRIER_INITIAL_DELAY")
        .env_remove("RETRIER_MULTIPLIER")
        .env_remove("RETRIER_MAX_DELAY")
        .env_remove("RUST_LOG");
    cmd
}

/// Shell script appending a line to `log` on every run, then failing with `message`.
fn failing_script(log: &Path, message: &str) -> String {
    format!(
        "echo run >> '{}'; echo '{}' >&2; exit 1",
        log.display(),
        message
    )
}

fn runs(log: &Path) -> usize {
    std::fs::read_to_string(log)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[test]
fn test_version() {
    let home = tempdir().unwrap();
    retrier(&home).arg("--version").assert().success();
}

#[test]
fn test_run_succeeds_first_time() {
    let home = tempdir().unwrap();
    retrier(&home)
        .args(["run", "--", "sh", "-c", "echo hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"))
        .stderr(predicate::str::contains("attempt").not());
}

#[test]
fn test_run_gives_up_after_all_attempts() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");

    retrier(&home)
        .args(["-n", "3", "--initial-delay", "1", "run", "--", "sh", "-c"])
        .arg(format!("echo run >> '{}'; exit 4", log.display()))
        .assert()
        .code(4)
        .stderr(predicate::str::contains("retrier: attempt 1 failed"))
        .stderr(predicate::str::contains("retrier: attempt 2 failed"))
        .stderr(predicate::str::contains("attempt 3 failed").not())
        .stderr(predicate::str::contains("exited with status 4"));

    assert_eq!(runs(&log), 3);
}

#[test]
fn test_run_recovers_on_second_attempt() {
    let home = tempdir().unwrap();
    let marker = home.path().join("ran-once");

    retrier(&home)
        .args(["--initial-delay", "10", "run", "--", "sh", "-c"])
        .arg(format!(
            "if [ -e '{0}' ]; then echo recovered; else touch '{0}'; exit 1; fi",
            marker.display()
        ))
        .assert()
        .success()
        .stdout(predicate::str::contains("recovered"))
        .stderr(predicate::str::contains("retrier: attempt 1 failed"));
}

#[test]
fn test_transient_only_stops_on_permanent_failure() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");

    retrier(&home)
        .args(["-n", "5", "--initial-delay", "1", "--transient-only"])
        .args(["run", "--", "sh", "-c"])
        .arg(failing_script(&log, "Invalid input"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));

    assert_eq!(runs(&log), 1);
}

#[test]
fn test_transient_only_retries_transient_failure() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");

    retrier(&home)
        .args(["-n", "3", "--initial-delay", "1", "--transient-only"])
        .args(["run", "--", "sh", "-c"])
        .arg(failing_script(&log, "connect ETIMEDOUT"))
        .assert()
        .failure();

    assert_eq!(runs(&log), 3);
}

#[test]
fn test_config_file_sets_policy() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");
    let config = home.path().join("retry.json");
    std::fs::write(&config, r#"{"maxAttempts": 4, "initialDelayMs": 1}"#).unwrap();

    retrier(&home)
        .arg("--config")
        .arg(&config)
        .args(["run", "--", "sh", "-c"])
        .arg(failing_script(&log, "boom"))
        .assert()
        .failure();

    assert_eq!(runs(&log), 4);
}

// The platform config dir follows XDG_CONFIG_HOME only on Linux
#[cfg(target_os = "linux")]
#[test]
fn test_default_config_location_is_read() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");
    let dir = home.path().join("retrier");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.json"),
        r#"{"max_attempts": 2, "initial_delay_ms": 1}"#,
    )
    .unwrap();

    retrier(&home)
        .args(["run", "--", "sh", "-c"])
        .arg(failing_script(&log, "boom"))
        .assert()
        .failure();

    assert_eq!(runs(&log), 2);
}

#[test]
fn test_flags_override_config_file() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");
    let config = home.path().join("retry.json");
    std::fs::write(&config, r#"{"maxAttempts": 4, "initialDelayMs": 1}"#).unwrap();

    retrier(&home)
        .arg("--config")
        .arg(&config)
        .args(["-n", "2", "run", "--", "sh", "-c"])
        .arg(failing_script(&log, "boom"))
        .assert()
        .failure();

    assert_eq!(runs(&log), 2);
}

#[test]
fn test_env_vars_set_policy() {
    let home = tempdir().unwrap();
    let log = home.path().join("runs.log");

    retrier(&home)
        .env("RETRIER_ATTEMPTS", "2")
        .env("RETRIER_INITIAL_DELAY", "1")
        .args(["run", "--", "sh", "-c"])
        .arg(failing_script(&log, "boom"))
        .assert()
        .failure();

    assert_eq!(runs(&log), 2);
}

#[test]
fn test_invalid_policy_is_rejected() {
    let home = tempdir().unwrap();

    retrier(&home)
        .args(["--multiplier", "0.5", "run", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backoff multiplier"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let home = tempdir().unwrap();

    retrier(&home)
        .arg("--config")
        .arg(home.path().join("nope.json"))
        .args(["run", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn test_fetch_prints_body() {
    let home = tempdir().unwrap();
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/status")
        .with_status(200)
        .with_body("all good")
        .expect(1)
        .create();

    retrier(&home)
        .arg("fetch")
        .arg(format!("{}/status", server.url()))
        .assert()
        .success()
        .stdout("all good");

    mock.assert();
}

#[test]
fn test_fetch_retries_server_errors() {
    let home = tempdir().unwrap();
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/flaky")
        .with_status(503)
        .expect(2)
        .create();

    retrier(&home)
        .args(["-n", "2", "--initial-delay", "1", "fetch"])
        .arg(format!("{}/flaky", server.url()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("503"));

    mock.assert();
}

#[test]
fn test_fetch_transient_only_gives_up_on_not_found() {
    let home = tempdir().unwrap();
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .expect(1)
        .create();

    retrier(&home)
        .args(["-n", "3", "--initial-delay", "1", "--transient-only", "fetch"])
        .arg(format!("{}/missing", server.url()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));

    mock.assert();
}
