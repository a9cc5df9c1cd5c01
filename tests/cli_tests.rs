//! Command-line behaviour of the `phishhunter` binary that does not need
//! network access.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn phishhunter() -> assert_cmd::Command {
    cargo_bin_cmd!("phishhunter")
}

#[test]
fn test_no_arguments_prints_usage_and_fails() {
    let tmp = TempDir::new().expect("create temp dir");

    phishhunter()
        .current_dir(tmp.path())
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_help_lists_subcommands() {
    phishhunter()
        .arg("--help")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("hunt"))
        .stdout(predicate::str::contains("build-dataset"));
}

#[test]
fn test_hunt_without_target_is_rejected() {
    phishhunter()
        .arg("hunt")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_hunt_with_url_and_input_conflicts() {
    phishhunter()
        .args(["hunt", "--url", "http://a.invalid/", "--input", "refs.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_zero_limit_is_rejected() {
    phishhunter()
        .args(["build-dataset", "-i", "in.csv", "-o", "out.csv", "--limit", "0"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Limit must be greater than 0"));
}

#[test]
fn test_hunt_limit_without_dataset_is_rejected() {
    phishhunter()
        .args(["hunt", "-i", "refs.csv", "--limit", "2"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--limit requires --append-to"));
}

#[test]
fn test_init_creates_config_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = tmp.path().join("config").join("phishhunter.toml");

    phishhunter()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    assert!(config_path.exists(), "config file should have been created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[dns]"));
    assert!(content.contains("[classifier]"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let tmp = TempDir::new().expect("create temp dir");
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[dns\nnot toml").unwrap();

    phishhunter()
        .current_dir(tmp.path())
        .args(["--no-banner", "--config"])
        .arg(&bad)
        .args(["analyze", "-u", "http://a.invalid/"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_missing_model_fails_before_any_lookup() {
    let tmp = TempDir::new().expect("create temp dir");

    phishhunter()
        .current_dir(tmp.path())
        .args(["--no-banner", "hunt", "-u", "http://a.invalid/", "--model", "missing.json"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to"));
}
