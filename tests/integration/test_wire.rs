//! Wire protocol tests against a live daemon: routing, error codes, and
//! the one-of-four response fields contract. Symbol operations here target
//! paths that never resolve to a workspace, so no analysis process is
//! needed.

mod common;

use common::{send_raw, DaemonGuard};
use serde_json::json;

#[test]
fn test_definition_outside_any_workspace_is_an_error() {
    let daemon = DaemonGuard::start();

    // The temp runtime dir itself has no Swift markers anywhere above it
    // that classify, but use an explicit nonexistent path to be safe.
    let request = json!({
        "id": 9,
        "method": "definition",
        "parameters": {
            "filePath": "/nonexistent/Sources/App.swift",
            "line": 3,
            "column": 7
        }
    });
    let response = send_raw(&daemon.socket_path(), &request.to_string());

    assert_eq!(response["id"], 9);
    assert_eq!(response["error"]["code"], "workspace_not_found");
    assert!(
        response["error"]["message"].as_str().expect("message").contains("App.swift"),
        "message should name the offending path"
    );
    // Exactly one of the four response fields is populated.
    assert!(response["result"].is_null());
    assert!(response["symbolResults"].is_null());
    assert!(response["status"].is_null());
}

#[test]
fn test_unknown_method_is_a_decode_error() {
    let daemon = DaemonGuard::start();

    let response = send_raw(
        &daemon.socket_path(),
        &json!({"id": 1, "method": "transmogrify"}).to_string(),
    );

    assert_eq!(response["error"]["code"], "decode_error");
}

#[test]
fn test_search_without_query_is_a_decode_error() {
    let daemon = DaemonGuard::start();

    // Anchored to a real workspace so resolution succeeds and the missing
    // parameter is what fails.
    let workspace = tempfile::tempdir().expect("tempdir");
    std::fs::write(workspace.path().join("Package.swift"), "// swift-tools-version:5.9\n")
        .expect("write manifest");

    let request = json!({
        "id": 2,
        "method": "symbolSearch",
        "parameters": { "workspaceRootPath": workspace.path() }
    });
    let response = send_raw(&daemon.socket_path(), &request.to_string());

    assert_eq!(response["error"]["code"], "decode_error");
    assert!(response["error"]["message"]
        .as_str()
        .expect("message")
        .contains("query"));
}

#[test]
fn test_string_correlation_ids_are_echoed() {
    let daemon = DaemonGuard::start();

    let response = send_raw(
        &daemon.socket_path(),
        &json!({"id": "req-abc-123", "method": "status"}).to_string(),
    );
    assert_eq!(response["id"], "req-abc-123");
}

#[test]
fn test_invalid_position_is_reported_not_crashed() {
    let daemon = DaemonGuard::start();

    let workspace = tempfile::tempdir().expect("tempdir");
    std::fs::write(workspace.path().join("Package.swift"), "// swift-tools-version:5.9\n")
        .expect("write manifest");
    let file = workspace.path().join("A.swift");
    std::fs::write(&file, "struct A {}\n").expect("write source");

    // Position 0 is rejected up front, before any analysis process spawns.
    let request = json!({
        "id": 3,
        "method": "hover",
        "parameters": {
            "workspaceRootPath": workspace.path(),
            "filePath": file,
            "line": 0,
            "column": 1
        }
    });
    let response = send_raw(&daemon.socket_path(), &request.to_string());

    assert_eq!(response["id"], 3);
    assert_eq!(response["error"]["code"], "decode_error");
    assert!(response["error"]["message"]
        .as_str()
        .expect("message")
        .contains("1-based"));
}
