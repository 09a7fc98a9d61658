//! Session pool: at most one analysis session per workspace key.
//!
//! A single async mutex around the map is the serialization point for
//! lookup, insertion, reaping, and shutdown. Symbol operations themselves
//! run outside the critical section so a slow workspace cannot stall the
//! others.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::daemon::protocol::{
    Method, RequestParameters, SessionStatus, SymbolInfo, SymbolSearchResult,
};
use crate::lsp::session::AnalysisSession;
use crate::utils::error::{Result, SkFindError};
use crate::workspace::{self, WorkspaceKey};

struct PoolEntry {
    session: Arc<AnalysisSession>,
    /// Monotonic, for idle reaping.
    last_used: Instant,
    /// Wall clock, for status reporting only.
    last_used_wall: DateTime<Utc>,
}

impl PoolEntry {
    fn new(session: Arc<AnalysisSession>) -> Self {
        Self { session, last_used: Instant::now(), last_used_wall: Utc::now() }
    }
}

/// What a symbol operation produced.
#[derive(Debug)]
pub enum PoolReply {
    Symbol(SymbolInfo),
    Search(Vec<SymbolSearchResult>),
}

pub struct SessionPool {
    sessions: tokio::sync::Mutex<HashMap<WorkspaceKey, PoolEntry>>,
    idle_timeout: Duration,
}

impl SessionPool {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { sessions: tokio::sync::Mutex::new(HashMap::new()), idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Dispatch one symbol operation to the right session.
    ///
    /// Server-control methods never belong here; routing one in is a bug in
    /// the caller and answers `unsupported_method` rather than panicking.
    pub async fn handle(&self, method: Method, params: &RequestParameters) -> Result<PoolReply> {
        if method.is_server_control() {
            return Err(SkFindError::UnsupportedMethod { method: method.as_str().to_string() });
        }

        let key = resolve_key(params)?;
        let session = self.get_or_create(&key).await;

        let reply = match method {
            Method::Inspect => {
                let (file, line, column) = position_params(params)?;
                PoolReply::Symbol(session.inspect(&file, line, column).await?)
            }
            Method::Definition => {
                let (file, line, column) = position_params(params)?;
                PoolReply::Symbol(session.definition(&file, line, column).await?)
            }
            Method::Hover => {
                let (file, line, column) = position_params(params)?;
                PoolReply::Symbol(session.hover(&file, line, column).await?)
            }
            Method::SymbolSearch => {
                let query = params.query.as_deref().ok_or_else(|| SkFindError::DecodeError {
                    message: "symbolSearch requires 'query'".to_string(),
                })?;
                let enrich = params.enrich.unwrap_or(false);
                PoolReply::Search(session.search_symbols(query, params.limit, enrich).await?)
            }
            Method::Ping | Method::Status | Method::Shutdown => unreachable!("server control"),
        };

        // Only successful operations count as "use"; a failing workspace
        // stays eligible for reaping.
        self.touch(&key).await;
        Ok(reply)
    }

    /// Lookup-or-insert under the pool lock. Two concurrent requests for the
    /// same key always share one session.
    async fn get_or_create(&self, key: &WorkspaceKey) -> Arc<AnalysisSession> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::info!(
                    "creating session for {} ({})",
                    key.root.display(),
                    key.kind.as_str()
                );
                PoolEntry::new(Arc::new(AnalysisSession::new(key.clone())))
            });
        Arc::clone(&entry.session)
    }

    async fn touch(&self, key: &WorkspaceKey) {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(key) {
            entry.last_used = Instant::now();
            entry.last_used_wall = Utc::now();
        }
    }

    /// Remove and disconnect every session idle past the timeout. The
    /// removal set is computed and taken out under one lock acquisition;
    /// disconnects happen after the lock is released.
    pub async fn reap_idle(&self) {
        let reaped: Vec<(WorkspaceKey, Arc<AnalysisSession>)> = {
            let mut sessions = self.sessions.lock().await;
            let expired: Vec<WorkspaceKey> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_used.elapsed() >= self.idle_timeout)
                .map(|(key, _)| key.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|key| sessions.remove(&key).map(|entry| (key, entry.session)))
                .collect()
        };

        for (key, session) in reaped {
            tracing::info!("reaping idle session for {}", key.root.display());
            session.shutdown().await;
        }
    }

    /// Disconnect everything. Idempotent; used on daemon shutdown.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<AnalysisSession>> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, entry)| entry.session).collect()
        };
        for session in drained {
            session.shutdown().await;
        }
    }

    /// Per-session status lines, sorted by root path for determinism.
    pub async fn status(&self) -> Vec<SessionStatus> {
        let sessions = self.sessions.lock().await;
        let mut lines: Vec<SessionStatus> = sessions
            .iter()
            .map(|(key, entry)| SessionStatus {
                workspace_root_path: key.root.display().to_string(),
                kind: key.kind,
                last_used: entry.last_used_wall.to_rfc3339_opts(SecondsFormat::Secs, true),
            })
            .collect();
        lines.sort_by(|a, b| a.workspace_root_path.cmp(&b.workspace_root_path));
        lines
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

/// Resolve the workspace key a request targets.
fn resolve_key(params: &RequestParameters) -> Result<WorkspaceKey> {
    let anchor: &Path = match (&params.file_path, &params.workspace_root_path) {
        (Some(file), _) => file,
        (None, Some(root)) => root,
        (None, None) => {
            return Err(SkFindError::DecodeError {
                message: "request carries neither 'filePath' nor 'workspaceRootPath'".to_string(),
            });
        }
    };
    workspace::resolve(params.workspace_root_path.as_deref(), anchor)
}

fn position_params(params: &RequestParameters) -> Result<(String, u32, u32)> {
    let file: &PathBuf = params.file_path.as_ref().ok_or_else(|| SkFindError::DecodeError {
        message: "position request requires 'filePath'".to_string(),
    })?;
    let line = params.line.ok_or_else(|| SkFindError::DecodeError {
        message: "position request requires 'line'".to_string(),
    })?;
    let column = params.column.ok_or_else(|| SkFindError::DecodeError {
        message: "position request requires 'column'".to_string(),
    })?;
    Ok((file.display().to_string(), line, column))
}
