//! Integration tests for running the binary until it is signalled.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

fn spawn(args: &[&std::ffi::OsStr]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_logpipe"))
        .args(args)
        .env("XDG_CONFIG_HOME", "/tmp/logpipe-test-no-config")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_for_lines(path: &Path, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let lines = fs::read_to_string(path).map_or(0, |text| text.lines().count());
        if lines >= count {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {count} lines");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn terminate(child: &mut Child) -> std::process::ExitStatus {
    let pid = libc::pid_t::try_from(child.id()).unwrap();
    assert_eq!(unsafe { libc::kill(pid, libc::SIGTERM) }, 0);
    child.wait().unwrap()
}

#[test]
fn sigterm_stops_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("access.log");
    let output = dir.path().join("events.jsonl");
    fs::write(
        &input,
        "127.0.0.1 - - [10/Oct/2023:13:55:36 +0000] \"GET /a?page=2 HTTP/1.1\" 200 512\n\
         127.0.0.1 - bob [10/Oct/2023:13:55:37 +0000] \"POST /b HTTP/1.1\" 201 -\n",
    )
    .unwrap();

    let mut child = spawn(&[
        input.as_os_str(),
        "--from-beginning".as_ref(),
        "--poll-interval-ms".as_ref(),
        "20".as_ref(),
        "--output".as_ref(),
        output.as_os_str(),
    ]);
    wait_for_lines(&output, 2);

    let status = terminate(&mut child);
    assert!(status.success(), "{status:?}");

    let text = fs::read_to_string(&output).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events[0]["page"], 2);
    assert_eq!(events[0]["status"], 200);
    assert_eq!(events[0]["time_local"], "2023-10-10T13:55:36+00:00");
    assert_eq!(events[1]["remote_user"], "bob");
    assert_eq!(events[1]["body_bytes_sent"], "-");
}

#[test]
fn config_file_settings_apply() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("app.log");
    let output = dir.path().join("from-config.jsonl");
    let config = dir.path().join("config.toml");
    fs::write(&input, "level=warn took=1.5\n").unwrap();
    fs::write(
        &config,
        format!(
            "pattern = '^level=(?P<level>\\S+) took=(?P<took>\\S+)$'\n\
             keys_to_ignore = [\"level\"]\n\n\
             [tail]\nfrom_beginning = true\npoll_interval_ms = 20\n\n\
             [file]\noutput = {:?}\n",
            output.display().to_string()
        ),
    )
    .unwrap();

    let mut child = spawn(&["--config".as_ref(), config.as_os_str(), input.as_os_str()]);
    wait_for_lines(&output, 1);
    assert!(terminate(&mut child).success());

    let text = fs::read_to_string(&output).unwrap();
    let event: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(event, serde_json::json!({"took": 1.5}));
}
