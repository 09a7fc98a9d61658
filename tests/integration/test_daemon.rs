//! Daemon lifecycle tests: singleton locking, stale-socket recovery,
//! graceful shutdown, and the server-control methods. None of these need
//! sourcekit-lsp installed; no analysis session is ever started.

mod common;

use common::{send_raw, skf_binary, DaemonGuard, RUNTIME_DIR_ENV};
use serde_json::json;
use std::os::unix::net::UnixListener;
use std::time::Duration;

#[test]
fn test_ping_round_trip() {
    let daemon = DaemonGuard::start();

    let response = send_raw(&daemon.socket_path(), &json!({"id": 41, "method": "ping"}).to_string());

    assert_eq!(response["id"], 41, "correlation id must be echoed");
    assert!(response["error"].is_null());
    let status = &response["status"];
    assert_eq!(status["socketPath"], daemon.socket_path().display().to_string());
    assert_eq!(status["sessions"], json!([]));
}

#[test]
fn test_status_reports_idle_timeout_and_log() {
    let daemon = DaemonGuard::start();

    let response =
        send_raw(&daemon.socket_path(), &json!({"id": "s-1", "method": "status"}).to_string());

    assert_eq!(response["id"], "s-1");
    let status = &response["status"];
    assert_eq!(status["idleTimeoutSecs"], 300);
    assert!(status["logPath"].as_str().expect("logPath").ends_with("daemon.log"));
}

#[test]
fn test_shutdown_replies_then_exits_and_cleans_up() {
    let mut daemon = DaemonGuard::start();
    let socket = daemon.socket_path();
    let pid_file = daemon.runtime_dir.path().join("daemon.pid");
    assert!(pid_file.exists());

    // The response must arrive on this connection before the daemon stops.
    let response = send_raw(&socket, &json!({"id": 1, "method": "shutdown"}).to_string());
    assert!(response["status"].is_object());

    assert!(daemon.wait_for_exit(Duration::from_secs(5)), "daemon should exit after shutdown");
    assert!(!socket.exists(), "socket file must be removed on shutdown");
    assert!(!pid_file.exists(), "pid file must be removed on shutdown");
}

#[test]
fn test_second_daemon_fails_fast() {
    let daemon = DaemonGuard::start();

    // Same runtime dir: the instance lock must reject the second daemon
    // quickly instead of letting it wait for the lock.
    assert_cmd::Command::new(skf_binary())
        .args(["daemon", "start", "--foreground"])
        .env(RUNTIME_DIR_ENV, daemon.runtime_dir.path())
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicates::str::contains("already"));
}

#[test]
fn test_stale_socket_is_recovered_on_start() {
    // A socket file with no listener behind it is what a SIGKILLed daemon
    // leaves. A fresh daemon must clear it and come up.
    let runtime_dir = tempfile::tempdir().expect("tempdir");
    let socket = runtime_dir.path().join("daemon.sock");
    drop(UnixListener::bind(&socket).expect("bind"));
    assert!(socket.exists());

    let child = std::process::Command::new(skf_binary())
        .args(["daemon", "start", "--foreground"])
        .env(RUNTIME_DIR_ENV, runtime_dir.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("spawn daemon");

    // Poll until the new daemon answers.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut answered = false;
    while std::time::Instant::now() < deadline {
        if std::os::unix::net::UnixStream::connect(&socket).is_ok() {
            let response = send_raw(&socket, &json!({"id": 1, "method": "ping"}).to_string());
            assert!(response["status"].is_object());
            answered = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let mut child = child;
    let _ = child.kill();
    let _ = child.wait();
    assert!(answered, "daemon should recover from a stale socket");
}

#[test]
fn test_background_start_launches_daemon_when_absent() {
    // `skf daemon start` goes through the same reachability ladder as the
    // symbol commands; with no socket at all it must spawn a daemon and
    // wait for it to answer.
    let runtime_dir = tempfile::tempdir().expect("tempdir");
    let socket = runtime_dir.path().join("daemon.sock");

    assert_cmd::Command::new(skf_binary())
        .args(["daemon", "start"])
        .env(RUNTIME_DIR_ENV, runtime_dir.path())
        .timeout(Duration::from_secs(15))
        .assert()
        .success()
        .stdout(predicates::str::contains("daemon started"));

    let ping = send_raw(&socket, &json!({"id": 1, "method": "ping"}).to_string());
    assert!(ping["status"].is_object(), "launched daemon must answer pings");

    // The daemon is detached from the launching process; stop it ourselves.
    let bye = send_raw(&socket, &json!({"id": 2, "method": "shutdown"}).to_string());
    assert!(bye["status"].is_object());
}

#[test]
fn test_background_start_recovers_stale_socket() {
    // A leftover socket with no listener must be diagnosed and replaced by
    // the client side, without the user ever seeing an error.
    let runtime_dir = tempfile::tempdir().expect("tempdir");
    let socket = runtime_dir.path().join("daemon.sock");
    drop(UnixListener::bind(&socket).expect("bind"));
    assert!(socket.exists());

    assert_cmd::Command::new(skf_binary())
        .args(["daemon", "start"])
        .env(RUNTIME_DIR_ENV, runtime_dir.path())
        .timeout(Duration::from_secs(15))
        .assert()
        .success()
        .stdout(predicates::str::contains("daemon started"));

    let ping = send_raw(&socket, &json!({"id": 1, "method": "ping"}).to_string());
    assert!(ping["status"].is_object(), "fresh daemon must be behind the old socket path");

    let bye = send_raw(&socket, &json!({"id": 2, "method": "shutdown"}).to_string());
    assert!(bye["status"].is_object());
}

#[test]
fn test_malformed_request_gets_decode_error() {
    let daemon = DaemonGuard::start();

    let response = send_raw(&daemon.socket_path(), "this is not json");

    assert_eq!(response["error"]["code"], "decode_error");
    assert!(response["result"].is_null());
    // And the daemon survives the bad request.
    let ping = send_raw(&daemon.socket_path(), &json!({"id": 2, "method": "ping"}).to_string());
    assert!(ping["status"].is_object());
}

#[test]
fn test_daemon_stop_without_daemon() {
    let runtime_dir = tempfile::tempdir().expect("tempdir");

    assert_cmd::Command::new(skf_binary())
        .args(["daemon", "stop"])
        .env(RUNTIME_DIR_ENV, runtime_dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("not running"));
}

#[test]
fn test_daemon_status_without_daemon() {
    let runtime_dir = tempfile::tempdir().expect("tempdir");

    assert_cmd::Command::new(skf_binary())
        .args(["daemon", "status"])
        .env(RUNTIME_DIR_ENV, runtime_dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("not running"));
}
