//! Smoke tests for the instrumental CLI
//!
//! These tests drive the built binary end to end.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the instrumental binary
fn instrumental() -> Command {
    let mut cmd = Command::cargo_bin("instrumental").expect("instrumental binary should exist");
    cmd.env_remove("RUST_LOG").env_remove("INSTRUMENTAL_CONFIG");
    cmd
}

const BRANCH: &str = "\
if flag:
    print('taken')
else:
    print('skipped')
";

fn script(dir: &TempDir, name: &str, flag: bool) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let value = if flag { "True" } else { "False" };
    fs::write(&path, format!("flag = {value}\n{BRANCH}")).unwrap();
    path
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    instrumental()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    instrumental()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("combine"))
        .stdout(predicate::str::contains("report"));
}

#[test]
fn test_no_args_shows_help() {
    instrumental().assert().failure();
}

// ============================================================================
// Analyze / Render Tests
// ============================================================================

#[test]
fn test_analyze_lists_constructs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.src");
    fs::write(&path, "x = a and b\n").unwrap();
    instrumental()
        .args(["--color", "never", "analyze"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("app (1 lines, 1 constructs)"))
        .stdout(predicate::str::contains("LogicalAnd"));
}

#[test]
fn test_analyze_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.src");
    fs::write(&path, "if a:\n    pass\n").unwrap();
    let output = instrumental()
        .args(["analyze", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["modulename"], "app");
}

#[test]
fn test_analyze_missing_file_fails() {
    instrumental()
        .args(["analyze", "/nonexistent/app.src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to analyze 1 module(s)"));
}

#[test]
fn test_analyze_syntax_error_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.src");
    fs::write(&path, "if :\n").unwrap();
    instrumental().arg("analyze").arg(&path).assert().failure();
}

#[test]
fn test_render_shows_taps() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "app.src", true);
    instrumental()
        .arg("--dir")
        .arg(dir.path())
        .arg("render")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("_xxx_recorder_xxx_.record(flag, 'app', '2.1')"));
}

// ============================================================================
// Run / Combine / Report Workflow
// ============================================================================

#[test]
fn test_run_prints_program_output() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "app.src", true);
    instrumental()
        .arg("--dir")
        .arg(dir.path())
        .args(["run", "--summary"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("taken"))
        .stdout(predicate::str::contains("app: 1/2 hit (50%)"));
    assert!(dir.path().join(".instrumental.cov").exists());
}

#[test]
fn test_run_failure_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.src");
    fs::write(&path, "print('before')\nraise KeyError('k')\n").unwrap();
    instrumental()
        .arg("--dir")
        .arg(dir.path())
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("before"))
        .stderr(predicate::str::contains("KeyError"));
    assert!(!dir.path().join(".instrumental.cov").exists());
}

#[test]
fn test_combine_then_report() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.src");
    fs::write(&path, BRANCH).unwrap();
    let config = dir.path().join("instrumental.yaml");
    fs::write(&config, "label_store: true\n").unwrap();

    let mut stores = Vec::new();
    for (index, flag) in ["True", "False"].into_iter().enumerate() {
        let sub = dir.path().join(format!("w{index}"));
        instrumental()
            .arg("--dir")
            .arg(&sub)
            .arg("--config")
            .arg(&config)
            .args(["-q", "run", "--tag", &format!("w{index}"), "--set"])
            .arg(format!("flag={flag}"))
            .arg(&path)
            .assert()
            .success();
        let store = fs::read_dir(&sub)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|p| p.to_string_lossy().contains(".instrumental.cov.p"))
            .expect("labelled store should exist");
        stores.push(store);
    }

    let combined = dir.path().join("all.cov");
    instrumental()
        .arg("-q")
        .arg("combine")
        .args(&stores)
        .arg("--output")
        .arg(&combined)
        .assert()
        .success();

    instrumental()
        .args(["--color", "never", "report", "--format", "summary"])
        .arg(&combined)
        .assert()
        .success()
        .stdout(predicate::str::contains("app: 2/2 hit (100%)"));

    instrumental()
        .args(["report", "--all"])
        .arg(&combined)
        .assert()
        .success()
        .stdout(predicate::str::contains("Decision -> app:1.1 < flag >"))
        .stdout(predicate::str::contains("w0"))
        .stdout(predicate::str::contains("w1"));
}

#[test]
fn test_report_missing_store_fails() {
    let dir = TempDir::new().unwrap();
    instrumental()
        .arg("--dir")
        .arg(dir.path())
        .arg("report")
        .assert()
        .failure()
        .stderr(predicate::str::contains("I/O error"));
}
