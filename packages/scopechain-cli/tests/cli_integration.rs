use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn scopechain() -> Command {
    let mut cmd = Command::cargo_bin("scopechain").unwrap();
    for var in [
        "SCOPECHAIN_WIDTH",
        "SCOPECHAIN_DEPTH",
        "SCOPECHAIN_SELECTORS",
        "SCOPECHAIN_FILL",
        "SCOPECHAIN_MEAN_REMOVAL",
        "SCOPECHAIN_TICK_MS",
        "SCOPECHAIN_COMMAND",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn capture(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn path_of(file: &NamedTempFile) -> String {
    file.path().display().to_string()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    scopechain()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    scopechain()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scopechain"));
}

// =============================================================================
// CONFIG SUBCOMMAND
// =============================================================================

#[test]
fn test_config_defaults_json() {
    let output = scopechain().args(["config", "--json"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["width"], 16384);
    assert_eq!(parsed["depth"], 50);
    assert_eq!(parsed["selectors_per_source"], 2);
}

#[test]
fn test_config_env_override() {
    let output = scopechain()
        .env("SCOPECHAIN_DEPTH", "8")
        .args(["config", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["depth"], 8);
}

#[test]
fn test_config_invalid_env_is_input_error() {
    scopechain()
        .env("SCOPECHAIN_DEPTH", "0")
        .arg("config")
        .assert()
        .code(2);
}

// =============================================================================
// DECODE SUBCOMMAND
// =============================================================================

#[test]
fn test_decode_valid_capture() {
    let file = capture(&["1 1.0 2.0 3.0", "2 4.0 5.0 6.0"]);
    scopechain()
        .args(["decode", &path_of(&file), "--width", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 valid, 0 invalid"));
}

#[test]
fn test_decode_reports_invalid_lines() {
    let file = capture(&["1 1.0 2.0 3.0", "1 1.0 2.0", "9 1.0 2.0 3.0"]);
    let output = scopechain()
        .args(["decode", &path_of(&file), "--width", "3", "--json"])
        .assert()
        .code(2);

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["valid"], 1);
    assert_eq!(parsed["invalid"], 2);
    assert_eq!(parsed["lines"][1]["valid"], false);
    assert_eq!(parsed["lines"][0]["selector"], 1);
}

#[test]
fn test_decode_rate_mismatch_is_fatal() {
    let file = capture(&["125000000 1 0.0 0.0", "62500000 1 0.0 0.0"]);
    scopechain()
        .args(["decode", &path_of(&file), "--width", "2", "--rate-token"])
        .assert()
        .code(4);
}

#[test]
fn test_decode_from_stdin() {
    scopechain()
        .args(["decode", "--width", "2", "--sequence"])
        .write_stdin("17 2 0.5 0.5\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("selector 2"));
}

#[test]
fn test_decode_missing_file() {
    scopechain()
        .args(["decode", "/nonexistent/capture.txt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Cannot open"));
}

// =============================================================================
// WATCH SUBCOMMAND
// =============================================================================

#[test]
fn test_watch_file_sources_json_summary() {
    let a = capture(&["1 1.0 1.0", "2 2.0 2.0", "1 3.0 3.0"]);
    let b = capture(&["2 7.0 9.0"]);

    let output = scopechain()
        .args([
            "watch",
            &format!("file:{}", path_of(&a)),
            &format!("file:{}", path_of(&b)),
            "--width",
            "2",
            "--depth",
            "4",
            "--json",
            "--quiet",
        ])
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let channels = parsed["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 4);
    assert_eq!(channels[0]["filled"], 2);
    assert_eq!(channels[0]["latest"]["mean"], 3.0);
    assert_eq!(channels[1]["filled"], 1);
    assert_eq!(channels[2]["filled"], 0);
    assert_eq!(channels[3]["latest"]["mean"], 8.0);
    assert_eq!(parsed["stats"]["records_inserted"], 4);
    assert_eq!(parsed["sources"][1]["state"], "closed");
}

#[test]
fn test_watch_zero_tick_is_input_error() {
    let file = capture(&["1 1.0 1.0"]);
    scopechain()
        .args([
            "watch",
            &format!("file:{}", path_of(&file)),
            "--width",
            "2",
            "--tick-ms",
            "0",
            "--quiet",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("tick_ms"));
}

#[test]
fn test_watch_device_without_template() {
    scopechain()
        .args(["watch", "10.0.0.7", "--quiet"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("command template"));
}

#[test]
fn test_watch_unreachable_tcp_source() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    scopechain()
        .args(["watch", &format!("tcp://127.0.0.1:{}", port), "--quiet"])
        .assert()
        .code(3);
}

#[cfg(unix)]
#[test]
fn test_watch_command_template() {
    let capture = capture(&["1 0.25 0.75"]);
    scopechain()
        .args([
            "watch",
            &path_of(&capture),
            "--command",
            "cat {address}",
            "--width",
            "2",
            "--selectors",
            "1",
            "--quiet",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 records"));
}
