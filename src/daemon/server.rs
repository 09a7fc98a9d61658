//! Daemon supervisor: singleton lock, socket lifecycle, accept loop.
//!
//! Startup order matters: the instance lock comes first so two daemons can
//! never both reach the socket-handling steps, then the leftover socket
//! check, then bind, then the pid file. Cleanup runs every step even when
//! one fails, so a crash mid-shutdown leaves as little debris as possible.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::config::RuntimePaths;
use crate::daemon::pool::{PoolReply, SessionPool};
use crate::daemon::protocol::{DaemonStatus, Method, WireRequest, WireResponse};
use crate::daemon::transport;
use crate::utils::error::SkFindError;

/// How long a session may sit unused before the reaper disconnects it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Reaper cadence. An idle session lives at most timeout + one interval.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Bound on reading one request. A client that connects and goes silent
/// ties up one task for at most this long.
const REQUEST_READ_DEADLINE: Duration = Duration::from_secs(30);

/// Exclusive `flock` on the lock file, held for the daemon's lifetime.
/// The kernel releases it when the process exits, however it exits. This
/// is what makes crash recovery possible without lock-file staleness logic.
struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("opening lock file {}", path.display()))?;

        // SAFETY: flock on a valid owned fd.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            anyhow::bail!(
                "another daemon instance is already running (lock held on {})",
                path.display()
            );
        }
        Ok(Self { _file: file })
    }
}

pub struct DaemonServer {
    paths: RuntimePaths,
    pool: Arc<SessionPool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DaemonServer {
    pub fn new(paths: RuntimePaths, idle_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { paths, pool: Arc::new(SessionPool::new(idle_timeout)), shutdown_tx }
    }

    /// Run the daemon until a shutdown request arrives. Blocks the caller.
    pub async fn run(&self) -> Result<()> {
        let _lock = InstanceLock::acquire(&self.paths.lock_file)?;

        self.remove_stale_socket().await?;

        let listener = UnixListener::bind(&self.paths.socket_file)
            .with_context(|| format!("binding {}", self.paths.socket_file.display()))?;
        restrict_socket_permissions(&self.paths.socket_file)?;

        std::fs::write(&self.paths.pid_file, format!("{}\n", std::process::id()))
            .with_context(|| format!("writing pid file {}", self.paths.pid_file.display()))?;

        tracing::info!(
            "daemon listening on {} (pid {})",
            self.paths.socket_file.display(),
            std::process::id()
        );

        let result = self.accept_loop(listener).await;
        self.cleanup().await;
        result
    }

    /// A socket file with no live daemon behind it is debris from a crash.
    /// Distinguish by connecting: refusal or disappearance means stale,
    /// success means a live daemon that the instance lock somehow missed;
    /// treat that as fatal rather than stealing its socket.
    async fn remove_stale_socket(&self) -> Result<()> {
        let socket = &self.paths.socket_file;
        if !socket.exists() {
            return Ok(());
        }

        match UnixStream::connect(socket).await {
            Ok(_) => {
                anyhow::bail!("a daemon is already serving {}", socket.display());
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::ConnectionRefused
                    || e.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::warn!("removing stale socket {}", socket.display());
                std::fs::remove_file(socket)
                    .with_context(|| format!("removing stale socket {}", socket.display()))?;
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("checking {}", socket.display())),
        }
    }

    async fn accept_loop(&self, listener: UnixListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut reap_timer = tokio::time::interval(REAP_INTERVAL);
        reap_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let pool = Arc::clone(&self.pool);
                            let paths = self.paths.clone();
                            let shutdown_tx = self.shutdown_tx.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, pool, paths, shutdown_tx).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                        }
                    }
                }
                _ = reap_timer.tick() => {
                    self.pool.reap_idle().await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Best effort, every step attempted regardless of earlier failures.
    /// Idempotent: missing files are fine.
    async fn cleanup(&self) {
        self.pool.shutdown_all().await;
        for path in [&self.paths.socket_file, &self.paths.pid_file] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("failed to remove {}: {e}", path.display());
                }
            }
        }
        // The instance lock is released when its fd closes on drop.
    }
}

/// Owner-only access on the socket; the runtime directory is the outer
/// boundary, this is the inner one.
fn restrict_socket_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting permissions on {}", path.display()))
}

/// One connection, one exchange. Decode failures still produce a
/// well-formed error response; only transport failures are logged and
/// dropped.
async fn handle_connection(
    mut stream: UnixStream,
    pool: Arc<SessionPool>,
    paths: RuntimePaths,
    shutdown_tx: broadcast::Sender<()>,
) {
    use tokio::io::AsyncWriteExt;

    let payload =
        match transport::read_frame(&mut stream, Some(REQUEST_READ_DEADLINE), "request").await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("dropping connection: {e}");
                return;
            }
        };

    let (response, stop_after_reply) = match serde_json::from_slice::<WireRequest>(&payload) {
        Ok(request) => {
            let stop = request.method == Method::Shutdown;
            (route_request(request, &pool, &paths).await, stop)
        }
        Err(e) => {
            let error = SkFindError::DecodeError { message: e.to_string() };
            (WireResponse::error(serde_json::Value::Null, &error), false)
        }
    };

    match serde_json::to_vec(&response) {
        Ok(bytes) => {
            if let Err(e) = transport::write_frame(&mut stream, &bytes).await {
                tracing::debug!("failed to write response: {e}");
            }
            let _ = stream.shutdown().await;
        }
        Err(e) => {
            tracing::warn!("failed to serialize response: {e}");
        }
    }

    // The shutdown reply must be on the wire before the accept loop stops,
    // otherwise the requesting client reads an empty frame.
    if stop_after_reply {
        let _ = shutdown_tx.send(());
    }
}

async fn route_request(
    request: WireRequest,
    pool: &SessionPool,
    paths: &RuntimePaths,
) -> WireResponse {
    let id = request.id.clone();
    tracing::debug!("handling {} request", request.method.as_str());

    if request.method.is_server_control() {
        let status = DaemonStatus {
            socket_path: paths.socket_file.display().to_string(),
            idle_timeout_secs: pool.idle_timeout().as_secs(),
            log_path: paths.log_file.display().to_string(),
            sessions: pool.status().await,
        };
        return WireResponse::status(id, status);
    }

    match pool.handle(request.method, &request.parameters).await {
        Ok(PoolReply::Symbol(info)) => WireResponse::result(id, info),
        Ok(PoolReply::Search(results)) => WireResponse::symbol_results(id, results),
        Err(e) => {
            tracing::debug!("{} failed: {e}", request.method.as_str());
            WireResponse::error(id, &e)
        }
    }
}
