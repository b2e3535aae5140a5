//! End-to-end CLI tests for the dataset-search binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("dataset-search").unwrap();
    // Keep the developer's own config and credentials out of the tests.
    let home = tempfile::tempdir().unwrap().keep();
    cmd.env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("KAGGLE_CONFIG_DIR", home.join("kaggle"))
        .env_remove("KAGGLE_USERNAME")
        .env_remove("KAGGLE_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Discover marketplace datasets"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("search"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dataset-search"));
}

/// Test that a missing subcommand is a usage error.
#[test]
fn test_binary_without_subcommand_fails() {
    bin().assert().failure().stderr(predicate::str::contains("Usage"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    bin()
        .args(["--invalid-flag", "serve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that an unknown config key aborts startup with the key named.
#[test]
fn test_binary_rejects_bad_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "concurrency = 4\n").unwrap();

    bin()
        .args(["--config", config.to_str().unwrap(), "search", "titanic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

/// Test that a missing explicit config file is an error.
#[test]
fn test_binary_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.toml");

    bin()
        .args(["--config", config.to_str().unwrap(), "search", "titanic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

/// Test that an empty keyword fails before contacting the marketplace.
#[test]
fn test_binary_search_empty_keyword_fails() {
    bin()
        .args(["-q", "search", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Keyword cannot be empty"));
}

/// Test a one-shot search against a mock marketplace.
#[tokio::test]
async fn test_binary_search_prints_json() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/api/v1/datasets/list"))
        .and(query_param("search", "titanic"))
        .and(query_param("sortBy", "votes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ref": "a/titanic", "title": "Titanic"},
            {"ref": "a/titanic", "title": "Duplicate"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/api/v1", server.uri());
    let output = tokio::task::spawn_blocking(move || {
        bin()
            .args([
                "-q",
                "--marketplace-url",
                base.as_str(),
                "--min-delay-ms",
                "0",
                "search",
                "titanic",
                "--sort",
                "votes",
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["reference"], "a/titanic");
}

/// Test a tag-only search with a file-type filter.
#[tokio::test]
async fn test_binary_search_by_tag_filters_records() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/api/v1/datasets/list"))
        .and(query_param("search", "tag:finance"))
        .and(query_param("fileType", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ref": "a/loans", "title": "Loans", "tags": ["finance"]},
            {"ref": "a/football", "title": "Football", "tags": ["sports"]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/api/v1", server.uri());
    let output = tokio::task::spawn_blocking(move || {
        bin()
            .args([
                "-q",
                "--marketplace-url",
                base.as_str(),
                "--min-delay-ms",
                "0",
                "search",
                "--tag",
                "finance",
                "--file-type",
                "json",
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["reference"], "a/loans");
}
