//! Binary-level tests for the parts of startup that don't need a live
//! Postgres: flag parsing and the config-validation failures that happen
//! before the first database connection is attempted.

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("traffic-analyzer"))
}

#[test]
fn help_flag_describes_the_service() {
    cmd()
        .env_clear()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Capture ingestion and operation reconciliation service"));
}

#[test]
fn version_flag_reports_build_metadata() {
    cmd()
        .env_clear()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")).and(contains("commit")));
}

#[test]
fn missing_base_path_is_startup_fatal() {
    cmd()
        .env_clear()
        .assert()
        .failure()
        .stderr(contains("configuration error").and(contains("BASE_PATH")));
}

#[test]
fn missing_db_port_is_startup_fatal_once_base_fields_are_set() {
    cmd()
        .env_clear()
        .env("BASE_PATH", ".")
        .env("WORK_DIR", "/tmp/traffic-analyzer-test-workdir")
        .assert()
        .failure()
        .stderr(contains("configuration error").and(contains("APIHUB_TRAFFIC_POSTGRESQL_PORT")));
}

#[test]
fn production_mode_without_api_key_is_rejected_before_any_db_access() {
    cmd()
        .env_clear()
        .env("BASE_PATH", ".")
        .env("WORK_DIR", "/tmp/traffic-analyzer-test-workdir")
        .env("PRODUCTION_MODE", "true")
        .assert()
        .failure()
        .stderr(contains("configuration error").and(contains("TRAFFIC_API_KEY")));
}
