//! Integration tests for argument handling and exit codes.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn logpipe() -> Command {
    let mut cmd = Command::cargo_bin("logpipe").unwrap();
    cmd.env("XDG_CONFIG_HOME", "/tmp/logpipe-test-no-config");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_describes_tool() {
    logpipe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tail a log file"))
        .stdout(predicate::str::contains("--from-beginning"));
}

#[test]
fn missing_input_argument_is_usage_error() {
    logpipe().assert().failure().code(2);
}

#[test]
fn missing_input_file_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.jsonl");
    logpipe()
        .arg(dir.path().join("absent.log"))
        .arg("--output")
        .arg(&output)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot open input"));
    assert!(!output.exists());
}

#[test]
fn invalid_pattern_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.log");
    std::fs::write(&input, "").unwrap();
    logpipe()
        .arg(&input)
        .args(["--pattern", "(?P<open"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid line pattern"));
}

#[test]
fn missing_explicit_config_exits_one() {
    logpipe()
        .args(["--config", "/tmp/logpipe-test-missing/config.toml", "in.log"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot read config file"));
}

#[test]
fn malformed_config_exits_one() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "pattern = [not toml").unwrap();
    logpipe()
        .arg("--config")
        .arg(file.path())
        .arg("in.log")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("config file error"));
}

#[test]
fn zero_queue_capacity_rejected() {
    logpipe()
        .args(["--queue-capacity", "0", "in.log"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("queue capacity"));
}

#[test]
fn invalid_log_level_rejected() {
    logpipe()
        .args(["--log-level", "verbose", "in.log"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid level"));
}

#[test]
fn completions_need_no_input() {
    logpipe()
        .args(["--completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("logpipe"));
}
