//! Shared helpers for daemon integration tests.
//!
//! Each test gets its own runtime directory via the environment override,
//! so tests never touch a real user daemon and can run in parallel.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub const RUNTIME_DIR_ENV: &str = "SOURCEKIT_FIND_RUNTIME_DIR";

pub fn skf_binary() -> PathBuf {
    assert_cmd::cargo::cargo_bin("skf")
}

/// A foreground daemon bound to its own runtime directory. Killed on drop
/// so a failing test never leaks a process.
pub struct DaemonGuard {
    child: Child,
    pub runtime_dir: tempfile::TempDir,
}

impl DaemonGuard {
    /// Spawn a foreground daemon and wait until its socket answers.
    pub fn start() -> Self {
        let runtime_dir = tempfile::tempdir().expect("tempdir");
        let child = Command::new(skf_binary())
            .args(["daemon", "start", "--foreground"])
            .env(RUNTIME_DIR_ENV, runtime_dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        let guard = Self { child, runtime_dir };
        guard.wait_for_socket();
        guard
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir.path().join("daemon.sock")
    }

    fn wait_for_socket(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if self.socket_path().exists() {
                // The file can exist a moment before the listener accepts.
                if UnixStream::connect(self.socket_path()).is_ok() {
                    return;
                }
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("daemon did not come up within 10s");
    }

    /// Wait for the daemon process to exit on its own.
    pub fn wait_for_exit(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// One wire exchange: connect, write, half-close, read to EOF, parse.
pub fn send_raw(socket: &Path, payload: &str) -> serde_json::Value {
    let mut stream = UnixStream::connect(socket).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    stream.write_all(payload.as_bytes()).expect("write");
    stream.shutdown(std::net::Shutdown::Write).expect("half-close");

    let mut reply = String::new();
    stream.read_to_string(&mut reply).expect("read to EOF");
    serde_json::from_str(&reply).expect("response is JSON")
}
