//! Process-wide runtime paths for the daemon's identity artifacts.
//!
//! One set of files per user, independent of any particular workspace:
//! socket (rendezvous address), pid file, instance lock, and log file.
//! Resolved once at startup and threaded explicitly into the components
//! that need it, with no hidden global lookups inside library code.

use anyhow::Result;
use std::path::PathBuf;

/// Environment variable that overrides the runtime directory. Used by the
/// integration tests to isolate daemons from each other and from a real
/// user daemon.
pub const RUNTIME_DIR_ENV: &str = "SOURCEKIT_FIND_RUNTIME_DIR";

/// Fixed filesystem locations for the daemon's runtime artifacts.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    pub runtime_dir: PathBuf,
    /// Rendezvous path for client connections.
    pub socket_file: PathBuf,
    /// Plain text file holding the daemon's process id.
    pub pid_file: PathBuf,
    /// Held exclusively (flock) for the daemon's whole lifetime.
    pub lock_file: PathBuf,
    /// Captures the daemon's diagnostic output when launched in the background.
    pub log_file: PathBuf,
}

impl RuntimePaths {
    /// Resolve the per-user runtime directory and create it if missing.
    ///
    /// Defaults to `/tmp/sourcekit-find-{uid}` on Unix so each user gets
    /// their own daemon instance; the trust boundary is the directory and
    /// socket file permissions.
    pub fn resolve() -> Result<Self> {
        let runtime_dir = match std::env::var_os(RUNTIME_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => Self::default_runtime_dir()?,
        };

        std::fs::create_dir_all(&runtime_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&runtime_dir, permissions)?;
        }

        Ok(Self {
            socket_file: runtime_dir.join("daemon.sock"),
            pid_file: runtime_dir.join("daemon.pid"),
            lock_file: runtime_dir.join("daemon.lock"),
            log_file: runtime_dir.join("daemon.log"),
            runtime_dir,
        })
    }

    #[cfg(unix)]
    fn default_runtime_dir() -> Result<PathBuf> {
        // SAFETY: getuid has no failure mode and touches no memory.
        let uid = unsafe { libc::getuid() };
        Ok(PathBuf::from("/tmp").join(format!("sourcekit-find-{uid}")))
    }

    #[cfg(not(unix))]
    fn default_runtime_dir() -> Result<PathBuf> {
        anyhow::bail!("The daemon is only supported on Unix systems")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_runtime_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::env::set_var(RUNTIME_DIR_ENV, dir.path());
        let paths = RuntimePaths::resolve().expect("resolve");
        std::env::remove_var(RUNTIME_DIR_ENV);

        assert_eq!(paths.runtime_dir, dir.path());
        assert_eq!(paths.socket_file.parent(), Some(dir.path()));
        assert!(paths.socket_file.to_string_lossy().ends_with(".sock"));
        assert!(paths.pid_file.to_string_lossy().ends_with(".pid"));
        assert!(paths.lock_file.to_string_lossy().ends_with(".lock"));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_dir_contains_uid() {
        let dir = RuntimePaths::default_runtime_dir().expect("default dir");
        let uid = unsafe { libc::getuid() };
        assert!(dir.to_string_lossy().contains(&uid.to_string()));
    }
}
