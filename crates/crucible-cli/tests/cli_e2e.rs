//! End-to-end CLI tests using `assert_cmd`
//!
//! Every test points `HOME` at a temporary directory and uses a credential
//! variable that is never set, so no test touches the network or the real
//! user configuration.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const UNSET_KEY_ENV: &str = "CRUCIBLE_E2E_KEY_THAT_IS_NEVER_SET";

/// Helper to get cargo binary or fail test
fn cargo_bin(home: &TempDir) -> Command {
    let mut command =
        Command::cargo_bin("crucible").unwrap_or_else(|err| panic!("Binary not found: {err}"));
    command
        .current_dir(home.path())
        .env("HOME", home.path())
        .env_remove("RUST_LOG")
        .env_remove(UNSET_KEY_ENV);
    command
}

/// Helper to create temp dir or fail test
fn temp_dir() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("Failed to create temp dir: {err}"))
}

/// Writes a config without credentials and returns its path.
fn keyless_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("crucible.toml");
    fs::write(
        &path,
        format!(
            "[endpoint]\napi_key_env = \"{UNSET_KEY_ENV}\"\n\n[execution]\nmax_iterations = 2\n"
        ),
    )
    .unwrap_or_else(|err| panic!("Failed to write config: {err}"));
    path
}

#[test]
fn test_cli_help() {
    let home = temp_dir();
    cargo_bin(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_cli_invalid_command() {
    let home = temp_dir();
    cargo_bin(&home).arg("invalid-command-xyz").assert().failure();
}

#[test]
fn test_config_creates_default_file() {
    let home = temp_dir();
    cargo_bin(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_iterations = 3"))
        .stdout(predicate::str::contains("[rubric]"));

    let created = home.path().join(".crucible").join("config.toml");
    let contents = fs::read_to_string(created).unwrap();
    assert!(contents.starts_with("# Crucible Configuration File"));
}

#[test]
fn test_config_applies_overrides_and_masks_key() {
    let home = temp_dir();
    let path = home.path().join("with-key.toml");
    fs::write(&path, "[endpoint]\napi_key = \"nvapi-very-secret\"\n").unwrap();

    cargo_bin(&home)
        .args(["--config", path.to_str().unwrap(), "--max-iterations", "7", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_iterations = 7"))
        .stdout(predicate::str::contains("nvapi-very-secret").not());
}

#[test]
fn test_zero_iterations_is_rejected() {
    let home = temp_dir();
    let config = keyless_config(&home);
    cargo_bin(&home)
        .args(["--config", config.to_str().unwrap(), "config", "--max-iterations", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_iterations"));
}

#[test]
fn test_non_integer_capacity_still_runs() {
    let home = temp_dir();
    let config = home.path().join("odd-capacity.toml");
    fs::write(
        &config,
        format!(
            "[endpoint]\napi_key_env = \"{UNSET_KEY_ENV}\"\n\n[execution]\nmax_concurrent_calls = \"three\"\n"
        ),
    )
    .unwrap();

    cargo_bin(&home)
        .args([
            "--config",
            config.to_str().unwrap(),
            "run",
            "--prompt",
            "Say hi",
            "--prompt",
            "Say bye",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("worker_failed after 1 iteration(s)").count(2));
}

#[test]
fn test_missing_task_file_fails() {
    let home = temp_dir();
    let config = keyless_config(&home);
    cargo_bin(&home)
        .args(["--config", config.to_str().unwrap(), "run", "--tasks", "absent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn test_run_without_credentials_reports_worker_failure() {
    let home = temp_dir();
    let config = keyless_config(&home);
    let tasks = home.path().join("tasks.toml");
    fs::write(
        &tasks,
        "[[tasks]]\nid = \"first\"\nprompt = \"Say hi\"\n\n[[tasks]]\nid = \"second\"\nprompt = \"Say bye\"\n",
    )
    .unwrap();

    cargo_bin(&home)
        .args([
            "--config",
            config.to_str().unwrap(),
            "run",
            "--tasks",
            tasks.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "first: worker_failed after 1 iteration(s)",
        ))
        .stdout(predicate::str::contains(
            "second: worker_failed after 1 iteration(s)",
        ))
        .stdout(predicate::str::contains("not_configured"));
}

#[test]
fn test_run_json_output() {
    let home = temp_dir();
    let config = keyless_config(&home);

    let output = cargo_bin(&home)
        .args([
            "--config",
            config.to_str().unwrap(),
            "run",
            "--prompt",
            "Explain tides",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let outcomes: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes = outcomes.as_array().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0]["outcome"], "completed");
    assert_eq!(outcomes[0]["status"], "worker_failed");
    assert_eq!(outcomes[0]["iterations"], 1);
    assert!(outcomes[0]["task_id"].as_str().unwrap().starts_with("task-"));
    assert!(outcomes[0].to_string().contains("not_configured"));
}

#[test]
fn test_ask_without_credentials_fails() {
    let home = temp_dir();
    let config = keyless_config(&home);
    cargo_bin(&home)
        .args(["--config", config.to_str().unwrap(), "ask", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(UNSET_KEY_ENV));
}
