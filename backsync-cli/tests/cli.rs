//! Binary-level checks that need no running Redis: argument parsing,
//! config handling and validation before any connection is attempted.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

/// Nothing listens on port 1, so any command that got as far as connecting
/// would fail with a connection error rather than the one asserted.
const UNREACHABLE_REDIS: &str = "redis://127.0.0.1:1";

fn backsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_backsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("BACKSYNC_CONFIG")
        .env_remove("BACKSYNC_REDIS_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("backsync.yaml");
    fs::write(&path, yaml).expect("write config");
    path
}

#[test]
fn help_lists_every_subcommand() {
    let home = TempDir::new().expect("home");
    let assert = backsync_cmd(home.path()).arg("--help").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");

    for sub in ["add", "top", "delete", "status", "worker", "config"] {
        assert!(stdout.contains(sub), "`{sub}` missing from help:\n{stdout}");
    }
}

#[test]
fn add_requires_at_least_one_item() {
    let home = TempDir::new().expect("home");
    backsync_cmd(home.path())
        .arg("add")
        .assert()
        .failure()
        .stderr(contains("ITEM"));
}

#[test]
fn config_init_writes_defaults_once() {
    let home = TempDir::new().expect("home");
    let path = home.path().join(".backsync").join("config.yaml");

    backsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(contains("wrote default config"));
    assert!(path.exists(), "config file should be created under HOME");

    backsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(contains("already exists"));

    backsync_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("lease_timeout_secs: 30"))
        .stdout(contains("claim_mode: atomic"))
        .stdout(contains("backsync:pending"));
}

#[test]
fn config_show_applies_file_and_env_overrides() {
    let home = TempDir::new().expect("home");
    let config = write_config(&home, "lease_timeout_secs: 90\ntie_policy: strict\n");

    backsync_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .env("BACKSYNC_REDIS_URL", "redis://cache.internal:6380")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("lease_timeout_secs: 90"))
        .stdout(contains("tie_policy: strict"))
        .stdout(contains("redis://cache.internal:6380"));
}

#[test]
fn config_path_can_come_from_env() {
    let home = TempDir::new().expect("home");
    let config = write_config(&home, "claim_mode: best_effort\n");

    backsync_cmd(home.path())
        .env("BACKSYNC_CONFIG", &config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("claim_mode: best_effort"));
}

#[test]
fn malformed_config_reports_its_path() {
    let home = TempDir::new().expect("home");
    let config = write_config(&home, "lease_timeout_secs: [oops\n");

    backsync_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--redis-url", UNREACHABLE_REDIS, "top", "5"])
        .assert()
        .failure()
        .stderr(contains("backsync.yaml"));
}

#[test]
fn invalid_config_is_rejected_before_connecting() {
    let home = TempDir::new().expect("home");
    let config = write_config(&home, "lease_timeout_secs: 0\n");

    backsync_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--redis-url", UNREACHABLE_REDIS, "add", "a"])
        .assert()
        .failure()
        .stderr(contains("lease_timeout_secs"));
}

#[test]
fn colliding_structure_ids_are_rejected() {
    let home = TempDir::new().expect("home");
    let config = write_config(&home, "version_hash: shared\nlease_hash: shared\n");

    backsync_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--redis-url", UNREACHABLE_REDIS, "status"])
        .assert()
        .failure()
        .stderr(contains("lease_hash"));
}

#[test]
fn worker_rejects_zero_batch_size() {
    let home = TempDir::new().expect("home");

    backsync_cmd(home.path())
        .args(["--redis-url", UNREACHABLE_REDIS, "worker", "--batch-size", "0"])
        .assert()
        .failure()
        .stderr(contains("worker.batch_size"));
}

#[test]
fn unreachable_redis_fails_cleanly() {
    let home = TempDir::new().expect("home");

    backsync_cmd(home.path())
        .args(["--redis-url", UNREACHABLE_REDIS, "top", "1"])
        .assert()
        .failure()
        .stderr(contains("127.0.0.1:1"));
}
