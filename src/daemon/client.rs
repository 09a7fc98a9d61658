//! Client side of the daemon protocol: one connection per request, plus
//! the recovery ladder that makes the daemon invisible to users.
//!
//! Reachability has four outcomes: a live daemon, no socket at all, a
//! stale socket nobody is listening on, and a wedged daemon that accepts
//! connections but never answers. The first needs nothing, the middle two
//! need a (re)launch, and the last needs the old process killed first.

use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;

use crate::config::RuntimePaths;
use crate::daemon::protocol::{
    DaemonStatus, Method, RequestParameters, SymbolInfo, SymbolSearchResult, WireRequest,
    WireResponse,
};
use crate::daemon::transport;
use crate::utils::error::{Result, SkFindError};

/// Deadline for ordinary position queries. Covers the daemon's worst-case
/// warm-up retry schedule with room to spare.
const BASE_DEADLINE: Duration = Duration::from_secs(30);

/// Extra read budget per search result when enrichment is on: each result
/// costs an extra definition+hover pair on the daemon side.
const ENRICH_PER_RESULT: Duration = Duration::from_millis(400);

/// Assumed result count for enriched searches without an explicit limit.
const ENRICH_DEFAULT_RESULTS: u32 = 50;

/// Hard ceiling on any single request deadline.
const MAX_DEADLINE: Duration = Duration::from_secs(120);

/// Quick health check deadline: long enough for a busy daemon to answer a
/// ping, short enough that diagnosing a wedged one doesn't feel like a hang.
const PING_DEADLINE: Duration = Duration::from_secs(2);

/// How long to wait for a freshly spawned daemon to come up.
const LAUNCH_WAIT: Duration = Duration::from_secs(5);

/// How long a terminated daemon gets to exit before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

pub struct DaemonClient {
    paths: RuntimePaths,
    base_deadline: Duration,
}

impl DaemonClient {
    pub fn new(paths: RuntimePaths) -> Self {
        Self { paths, base_deadline: BASE_DEADLINE }
    }

    /// Override the base request deadline (the `--timeout` flag). The
    /// enrichment allowance still scales on top of it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.base_deadline = timeout;
        }
        self
    }

    pub async fn inspect(&self, params: RequestParameters) -> Result<SymbolInfo> {
        self.symbol_request(Method::Inspect, params).await
    }

    pub async fn definition(&self, params: RequestParameters) -> Result<SymbolInfo> {
        self.symbol_request(Method::Definition, params).await
    }

    pub async fn hover(&self, params: RequestParameters) -> Result<SymbolInfo> {
        self.symbol_request(Method::Hover, params).await
    }

    pub async fn symbol_search(
        &self,
        params: RequestParameters,
    ) -> Result<Vec<SymbolSearchResult>> {
        let response = self.send_with_recovery(Method::SymbolSearch, params).await?;
        response.symbol_results.ok_or(SkFindError::NoResult)
    }

    /// Ping the daemon without any launch or recovery attempt.
    pub async fn ping(&self) -> Result<DaemonStatus> {
        let response = self
            .request(Method::Ping, RequestParameters::default(), PING_DEADLINE)
            .await?;
        response.status.ok_or(SkFindError::NoResult)
    }

    pub async fn status(&self) -> Result<DaemonStatus> {
        let response = self
            .request(Method::Status, RequestParameters::default(), PING_DEADLINE)
            .await?;
        response.status.ok_or(SkFindError::NoResult)
    }

    /// Ask a running daemon to shut down. No launch, no recovery: stopping
    /// a daemon that isn't there is not an error worth retrying.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Method::Shutdown, RequestParameters::default(), PING_DEADLINE).await?;
        Ok(())
    }

    pub fn socket_exists(&self) -> bool {
        self.paths.socket_file.exists()
    }

    async fn symbol_request(
        &self,
        method: Method,
        params: RequestParameters,
    ) -> Result<SymbolInfo> {
        let response = self.send_with_recovery(method, params).await?;
        response.result.ok_or(SkFindError::NoResult)
    }

    /// Send a request, making the daemon reachable first and retrying once
    /// after a transport failure (the daemon may have died between the
    /// reachability check and the request). A second transport failure
    /// surfaces as `DaemonUnavailable` so callers can fall back to a direct
    /// session.
    async fn send_with_recovery(
        &self,
        method: Method,
        params: RequestParameters,
    ) -> Result<WireResponse> {
        self.ensure_reachable().await?;
        let deadline = deadline_for(method, &params, self.base_deadline);

        match self.request(method, params.clone(), deadline).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_transport() => {
                tracing::warn!("request failed ({e}); re-establishing daemon and retrying");
                self.ensure_reachable().await?;
                match self.request(method, params, deadline).await {
                    Ok(response) => Ok(response),
                    Err(e) if e.is_transport() => Err(SkFindError::DaemonUnavailable {
                        message: format!("daemon unreachable after relaunch: {e}"),
                    }),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// One exchange: connect, write, half-close, read to EOF.
    async fn request(
        &self,
        method: Method,
        params: RequestParameters,
        deadline: Duration,
    ) -> Result<WireResponse> {
        use tokio::io::AsyncWriteExt;

        let request = WireRequest::new(method, params);
        let payload = serde_json::to_vec(&request)?;

        let mut stream =
            UnixStream::connect(&self.paths.socket_file).await.map_err(SkFindError::Io)?;
        transport::write_frame(&mut stream, &payload).await?;
        stream.shutdown().await.map_err(SkFindError::Io)?;

        let reply = transport::read_frame(&mut stream, Some(deadline), method.as_str()).await?;
        if reply.is_empty() {
            // Peer closed without answering; treat as a transport failure
            // so recovery kicks in.
            return Err(SkFindError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "daemon closed the connection without a response",
            )));
        }

        let response: WireResponse = serde_json::from_slice(&reply)?;
        if let Some(error) = &response.error {
            return Err(SkFindError::from_wire(&error.code, &error.message));
        }
        Ok(response)
    }

    /// Make the daemon reachable, whatever state it is in.
    pub async fn ensure_reachable(&self) -> Result<()> {
        if !self.socket_exists() {
            tracing::debug!("no daemon socket; launching");
            return self.launch_and_wait().await;
        }

        match UnixStream::connect(&self.paths.socket_file).await {
            Ok(stream) => {
                drop(stream);
                match self.ping().await {
                    Ok(_) => Ok(()),
                    Err(SkFindError::TimedOut { .. }) => {
                        // Accepts connections but never answers: wedged.
                        tracing::warn!("daemon accepted a connection but did not answer a ping");
                        self.terminate_wedged_daemon().await;
                        self.launch_and_wait().await
                    }
                    Err(e) if e.is_transport() => {
                        self.terminate_wedged_daemon().await;
                        self.launch_and_wait().await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::ConnectionRefused
                    || e.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::debug!("stale daemon socket; relaunching");
                let _ = std::fs::remove_file(&self.paths.socket_file);
                self.launch_and_wait().await
            }
            Err(e) => Err(SkFindError::DaemonUnavailable {
                message: format!("cannot reach daemon socket: {e}"),
            }),
        }
    }

    /// Spawn a background daemon and wait for it to answer a ping.
    async fn launch_and_wait(&self) -> Result<()> {
        spawn_daemon(&self.paths)?;

        let poll = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        while waited < LAUNCH_WAIT {
            tokio::time::sleep(poll).await;
            waited += poll;
            if self.socket_exists() && self.ping().await.is_ok() {
                tracing::debug!("daemon up after {waited:?}");
                return Ok(());
            }
        }

        Err(SkFindError::DaemonUnavailable {
            message: format!(
                "daemon did not come up within {LAUNCH_WAIT:?}; see {}",
                self.paths.log_file.display()
            ),
        })
    }

    /// Kill a daemon that accepts connections but never responds, then
    /// clear its runtime files. SIGTERM first, SIGKILL if it lingers.
    async fn terminate_wedged_daemon(&self) {
        if let Some(pid) = read_pid(&self.paths.pid_file) {
            // SAFETY: signal sends on a pid we read from our own pid file.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
            let deadline = std::time::Instant::now() + TERM_GRACE;
            while std::time::Instant::now() < deadline {
                // kill(pid, 0) checks liveness without sending a signal.
                if unsafe { libc::kill(pid, 0) } != 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if unsafe { libc::kill(pid, 0) } == 0 {
                tracing::warn!("daemon pid {pid} ignored SIGTERM; sending SIGKILL");
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                }
            }
        }

        for path in [&self.paths.socket_file, &self.paths.pid_file] {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Deadline for one request. Enriched searches get extra budget per
/// expected result, so an enriched request's deadline is always strictly
/// larger than the same request without enrichment.
fn deadline_for(method: Method, params: &RequestParameters, base: Duration) -> Duration {
    if method != Method::SymbolSearch || !params.enrich.unwrap_or(false) {
        return base;
    }

    let results = params
        .limit
        .and_then(|l| u32::try_from(l).ok())
        .unwrap_or(ENRICH_DEFAULT_RESULTS)
        .max(1);
    (base + ENRICH_PER_RESULT * results).min(MAX_DEADLINE)
}

fn read_pid(pid_file: &Path) -> Option<libc::pid_t> {
    let content = std::fs::read_to_string(pid_file).ok()?;
    content.trim().parse().ok()
}

/// Launch the daemon as a detached background process. The child re-execs
/// this binary with the foreground daemon subcommand; `setsid` detaches it
/// from our session so it survives the launching client.
fn spawn_daemon(paths: &RuntimePaths) -> Result<()> {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let exe = std::env::current_exe().map_err(SkFindError::Io)?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)
        .map_err(SkFindError::Io)?;
    let log_err = log.try_clone().map_err(SkFindError::Io)?;

    let mut command = Command::new(exe);
    command
        .args(["daemon", "start", "--foreground"])
        .env(crate::config::RUNTIME_DIR_ENV, &paths.runtime_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    // SAFETY: setsid is async-signal-safe, the only call made in the
    // pre-exec window.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(SkFindError::Io)?;
    tracing::debug!("spawned background daemon (pid {})", child.id());
    Ok(())
}
