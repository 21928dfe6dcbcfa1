//! Integration tests for the `wpas` CLI binary.
//!
//! Everything runs offline against temp files; no radio is touched.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// `wpas` with env isolation so the user's real config is never read.
fn wpas_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("wpas");
    cmd.env("HOME", "/tmp/wpas-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/wpas-cli-test-nonexistent")
        .env_remove("WPAS_CONFIG")
        .env_remove("WPAS_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const HOME_CONFIG: &str = r#"
[[networks]]
ssid = "home"
security = "wpa2-psk"
passphrase = "correct horse"
"#;

const SCAN: &str = r#"[
  {"bssid":"02:00:00:00:00:09","freq":2412,"level":-30,"ssid":"cafe"},
  {"bssid":"02:00:00:00:00:01","freq":2437,"level":-55,"ssid":"home","security":"wpa2-psk"}
]"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = wpas_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "Expected 'Usage' in:\n{stderr}");
}

#[test]
fn test_help_lists_commands() {
    wpas_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("select")
            .and(predicate::str::contains("replay"))
            .and(predicate::str::contains("check-config")),
    );
}

#[test]
fn test_version_flag() {
    wpas_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wpas"));
}

#[test]
fn test_completions_zsh() {
    wpas_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── wps-pin ─────────────────────────────────────────────────────────

#[test]
fn test_generated_pin_is_eight_digits() {
    let output = wpas_cmd().args(["wps-pin", "-o", "plain"]).output().unwrap();
    assert!(output.status.success());
    let pin = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    assert_eq!(pin.len(), 8, "unexpected PIN {pin:?}");
    assert!(pin.bytes().all(|b| b.is_ascii_digit()));
}

#[test]
fn test_pin_with_bad_checksum_fails() {
    wpas_cmd()
        .args(["wps-pin", "--check", "12345678"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("checksum"));
}

#[test]
fn test_pin_check_accepts_valid_pin() {
    wpas_cmd()
        .args(["wps-pin", "--check", "12345670", "-o", "json-compact"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""valid":true"#));
}

// ── select ──────────────────────────────────────────────────────────

#[test]
fn test_select_picks_configured_network() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", HOME_CONFIG);
    let scan = write(dir.path(), "scan.json", SCAN);

    wpas_cmd()
        .arg("--config")
        .arg(&config)
        .args(["select", "-o", "plain", "--scan"])
        .arg(&scan)
        .assert()
        .success()
        .stdout(predicate::str::diff("02:00:00:00:00:01 0\n"));
}

#[test]
fn test_select_table_explains_rejections() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", HOME_CONFIG);
    let scan = write(dir.path(), "scan.json", SCAN);

    wpas_cmd()
        .arg("--config")
        .arg(&config)
        .args(["select", "--color", "never", "--scan"])
        .arg(&scan)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("cafe")
                .and(predicate::str::contains("Selected 02:00:00:00:00:01")),
        );
}

#[test]
fn test_select_missing_scan_file() {
    wpas_cmd()
        .args(["select", "--scan", "/tmp/wpas-cli-test-nonexistent/scan.json"])
        .assert()
        .code(4);
}

#[test]
fn test_select_rejects_bad_own_addr() {
    let dir = tempfile::tempdir().unwrap();
    let scan = write(dir.path(), "scan.json", "[]");
    wpas_cmd()
        .args(["select", "--own-addr", "not-a-mac", "--scan"])
        .arg(&scan)
        .assert()
        .code(2);
}

// ── check-config ────────────────────────────────────────────────────

#[test]
fn test_check_config_ok() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", HOME_CONFIG);
    wpas_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check-config")
        .assert()
        .success()
        .stderr(predicate::str::contains("1 network(s)"));
}

#[test]
fn test_check_config_reports_every_problem() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "config.toml",
        r#"
[station]
ap_scan = 7

[[networks]]
ssid = "short"
security = "wpa2-psk"
passphrase = "short"
"#,
    );
    let output = wpas_cmd()
        .arg("--config")
        .arg(&config)
        .args(["check", "-o", "plain"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 2, "problems:\n{stdout}");
    assert!(stdout.contains("ap_scan"));
    assert!(stdout.contains("networks[0]"));
}

#[test]
fn test_explicit_missing_config_is_not_found() {
    wpas_cmd()
        .args(["--config", "/tmp/wpas-cli-test-nonexistent/none.toml", "check-config"])
        .assert()
        .code(4);
}

// ── replay ──────────────────────────────────────────────────────────

#[test]
fn test_replay_open_network_completes() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write(
        dir.path(),
        "scenario.json",
        r#"{
  "networks": [{"ssid": "lab"}],
  "steps": [
    {"step": "scan_results", "bss": [{"bssid": "02:00:00:00:00:01", "freq": 2412, "level": -40, "ssid": "lab"}]},
    {"step": "set_bssid", "bssid": "02:00:00:00:00:01"},
    {"step": "set_ssid", "ssid": "lab"},
    {"step": "event", "event": {"event": "assoc"}}
  ]
}"#,
    );

    wpas_cmd()
        .args(["replay", "-o", "plain"])
        .arg(&scenario)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("CTRL-EVENT-CONNECTED")
                .and(predicate::str::contains("COMPLETED 02:00:00:00:00:01")),
        );
}

#[test]
fn test_replay_json_reports_final_state() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write(
        dir.path(),
        "scenario.json",
        r#"{"networks": [{"ssid": "lab"}], "steps": [{"step": "scan_results", "bss": []}]}"#,
    );

    wpas_cmd()
        .args(["replay", "-o", "json-compact"])
        .arg(&scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""associations":0"#));
}

#[test]
fn test_replay_rejects_unknown_step() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write(
        dir.path(),
        "scenario.json",
        r#"{"steps": [{"step": "teleport"}]}"#,
    );

    wpas_cmd().arg("replay").arg(&scenario).assert().code(2);
}
