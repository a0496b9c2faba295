// ==============================================================================
// CLI Integration Tests: Exercise `protoc-gen-outline` via Subprocess
// ==============================================================================
//
// These tests run the compiled plugin binary the way a compiler does: request
// bytes on stdin, response bytes on stdout. They check the process-level
// contract (exit status, stdout carries only the envelope, logs on stderr) that
// the library tests in `driver.rs` cannot see.

mod common;

use std::io::Write;
use std::process::Stdio;

use assert_cmd::Command;
use assert_cmd::cargo::CommandCargoExt;
use common::simple_request;
use predicates::prelude::*;
use protoc_plugin::decode_response;

/// Helper to construct a `Command` for the plugin binary built by this crate.
#[allow(deprecated)] // cargo_bin() warns about custom build-dir; acceptable here
fn plugin_cmd() -> Command {
    let mut cmd = Command::cargo_bin("protoc-gen-outline")
        .expect("plugin binary should be built by cargo");
    cmd.env_remove("PROTOC_GEN_OUTLINE_LOG");
    cmd
}

#[test]
fn test_cli_generates_from_stdin() {
    let output = plugin_cmd()
        .write_stdin(simple_request(""))
        .output()
        .expect("run plugin");
    assert!(output.status.success(), "plugin should exit 0");

    let response = decode_response(&output.stdout).expect("stdout is exactly one response");
    assert_eq!(response.error(), None);
    assert_eq!(response.files().len(), 1);
    assert_eq!(response.files()[0].name, "a.out");
    assert_eq!(response.files()[0].content, "<generated for message M in package p>\n");
}

#[test]
fn test_cli_error_response_still_exits_zero() {
    let output = plugin_cmd()
        .write_stdin(simple_request("no_such_option"))
        .output()
        .expect("run plugin");
    assert!(
        output.status.success(),
        "a reported error is not a crash, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let response = decode_response(&output.stdout).expect("stdout is exactly one response");
    assert_eq!(response.error(), Some("unknown option: no_such_option"));
    assert!(response.files().is_empty());
}

#[test]
fn test_cli_logs_go_to_stderr() {
    let output = plugin_cmd()
        .env("PROTOC_GEN_OUTLINE_LOG", "debug")
        .write_stdin(simple_request(""))
        .output()
        .expect("run plugin");
    assert!(output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("generation succeeded"),
        "debug logs should appear on stderr"
    );
    // Logging must not corrupt the protocol channel.
    decode_response(&output.stdout).expect("stdout is exactly one response");
}

#[test]
fn test_cli_unknown_argument_fails() {
    plugin_cmd()
        .arg("--frobnicate")
        .write_stdin(Vec::new())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Unknown option: --frobnicate"));
}

#[test]
fn test_cli_version() {
    plugin_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("protoc-gen-outline "));
}

#[test]
fn test_cli_help() {
    plugin_cmd()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("--outline_opt"));
}

#[test]
#[allow(deprecated)] // cargo_bin() warns about custom build-dir; acceptable here
fn test_cli_closed_response_channel_exits_nonzero() {
    // assert_cmd always reads stdout, so drive the process by hand to close
    // the read end before the plugin answers.
    let mut child = std::process::Command::cargo_bin("protoc-gen-outline")
        .expect("plugin binary should be built by cargo")
        .env_remove("PROTOC_GEN_OUTLINE_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn plugin");
    drop(child.stdout.take());

    let mut stdin = child.stdin.take().expect("stdin is piped");
    stdin.write_all(&simple_request("")).expect("write request");
    drop(stdin);

    let status = child.wait().expect("wait for plugin");
    assert!(!status.success(), "no response was delivered, so the exit status must say so");
}
