use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const CONFIG_KEYS: &[&str] = &[
    "SANDCHAT_INFERENCE_URL",
    "SANDCHAT_API_KEY",
    "SANDCHAT_BIND",
    "SANDCHAT_DATA_DIR",
    "SANDCHAT_USER_ID_HEADER",
    "SANDCHAT_SYSTEM_PROMPT",
    "SANDCHAT_MAX_NEW_TOKENS",
    "SANDCHAT_TEMPERATURE",
    "SANDCHAT_WINDOW_SIZE",
    "SANDCHAT_MAX_TOOL_ITERATIONS",
    "SANDCHAT_SANDBOX_COMMAND",
    "SANDCHAT_SANDBOX_TIMEOUT_SECS",
    "SANDCHAT_RETRY_DELAY_MS",
    "SANDCHAT_PROFILE_DEV_SANDCHAT_INFERENCE_URL",
];

fn base_command() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("sandchat").expect("binary exists");
    for key in CONFIG_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    base_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn serve_dry_run_prints_defaults() {
    let tmp = tempdir().expect("tempdir");
    base_command()
        .current_dir(tmp.path())
        .args(["serve", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\": \"dry-run\""))
        .stdout(predicate::str::contains(
            "\"inference_url\": \"http://localhost:8080\"",
        ))
        .stdout(predicate::str::contains("\"bind\": \"127.0.0.1:8000\""))
        .stdout(predicate::str::contains("\"window_size\": 5"))
        .stdout(predicate::str::contains("\"api_key_present\": false"))
        .stdout(predicate::str::contains(".sandchat"));
}

#[test]
fn serve_dry_run_never_prints_the_api_key() {
    let tmp = tempdir().expect("tempdir");
    base_command()
        .current_dir(tmp.path())
        .env("SANDCHAT_API_KEY", "very-secret")
        .args(["serve", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"api_key_present\": true"))
        .stdout(predicate::str::contains("very-secret").not());
}

#[test]
fn serve_honors_profile_and_precedence() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join(".env.local"),
        "SANDCHAT_INFERENCE_URL=http://dotenv:8080\nSANDCHAT_WINDOW_SIZE=3\n",
    )
    .expect("write .env.local");

    base_command()
        .current_dir(tmp.path())
        .env("SANDCHAT_PROFILE_DEV_SANDCHAT_INFERENCE_URL", "http://env-profile:8080")
        .args([
            "serve",
            "--profile",
            "dev",
            "--bind",
            "0.0.0.0:9000",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"profile\": \"dev\""))
        .stdout(predicate::str::contains(
            "\"inference_url\": \"http://env-profile:8080\"",
        ))
        .stdout(predicate::str::contains("\"bind\": \"0.0.0.0:9000\""))
        .stdout(predicate::str::contains("\"window_size\": 3"));
}

#[test]
fn cli_flag_beats_environment() {
    let tmp = tempdir().expect("tempdir");
    base_command()
        .current_dir(tmp.path())
        .env("SANDCHAT_INFERENCE_URL", "http://from-env:8080")
        .args(["serve", "--inference-url", "http://from-cli:8080", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "\"inference_url\": \"http://from-cli:8080\"",
        ));
}

#[test]
fn invalid_numbers_are_config_errors() {
    let tmp = tempdir().expect("tempdir");
    base_command()
        .current_dir(tmp.path())
        .env("SANDCHAT_WINDOW_SIZE", "lots")
        .args(["serve", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "config error: SANDCHAT_WINDOW_SIZE is not a valid number",
        ));
}

#[test]
fn zero_tool_iterations_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    base_command()
        .current_dir(tmp.path())
        .env("SANDCHAT_MAX_TOOL_ITERATIONS", "0")
        .args(["serve", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be at least 1"));
}
