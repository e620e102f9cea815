#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn portrpc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_portrpc"))
        .env_remove("PORTRPC_OPTIONS")
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("portrpc should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn call_against_echo_host_prints_response() {
    let output = portrpc(&[
        "--format",
        "json",
        "call",
        "--method",
        "eth_getBalance",
        "--params",
        r#"["0x1"]"#,
        "--id",
        "a",
    ]);

    assert!(output.status.success());
    let out = stdout_json(&output);
    assert!(out["schema_id"]
        .as_str()
        .is_some_and(|id| id.ends_with("rpc-response.schema.json")));
    assert_eq!(out["ok"], serde_json::json!(true));
    assert_eq!(out["response"]["id"], serde_json::json!("a"));
    assert_eq!(
        out["response"]["result"]["method"],
        serde_json::json!("eth_getBalance")
    );
    assert_eq!(
        out["response"]["result"]["params"],
        serde_json::json!(["0x1"])
    );
}

#[test]
fn call_without_host_returns_124() {
    let output = portrpc(&["call", "--method", "x", "--no-host", "--handshake-timeout", "50ms"]);

    assert_eq!(output.status.code(), Some(124));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("handshake timed out"));
}

#[test]
fn options_json_sets_handshake_timeout() {
    let output = portrpc(&[
        "call",
        "--method",
        "x",
        "--no-host",
        "--options",
        r#"{"handshakeTimeout": 50}"#,
    ]);

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn silent_host_request_timeout_returns_124() {
    let output = portrpc(&[
        "call",
        "--method",
        "eth_blockNumber",
        "--silent-host",
        "--request-timeout",
        "100ms",
    ]);

    assert_eq!(output.status.code(), Some(124));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("request timed out"));
}

#[test]
fn invalid_params_is_usage_error() {
    let output = portrpc(&["call", "--method", "x", "--params", "[1,"]);

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--params is not valid JSON"));
}

#[test]
fn batch_raw_prints_one_response_per_method() {
    let output = portrpc(&[
        "--format",
        "raw",
        "batch",
        "--method",
        "eth_chainId",
        "--method",
        "net_version",
    ]);

    assert!(output.status.success());
    let batch = stdout_json(&output);
    let batch = batch.as_array().expect("raw batch output is an array");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0]["id"], serde_json::json!(1));
    assert_eq!(batch[1]["result"]["method"], serde_json::json!("net_version"));
}

#[test]
fn table_output_lists_batch_rows() {
    let output = portrpc(&["--format", "table", "batch", "-m", "a", "-m", "b"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("STATUS"));
    assert_eq!(stdout.matches("ok").count(), 2);
}

#[test]
fn version_prints_package_version() {
    let output = portrpc(&["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("portrpc {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_reports_defaults() {
    let output = portrpc(&["version", "--extended"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: portrpc"));
    assert!(stdout.contains("default_handshake_timeout_ms: 1000"));
    assert!(stdout.contains("notification_marker: _subscription"));
}
