//! Wire protocol between short-lived clients and the daemon.
//!
//! One JSON object per request, one per response, each exchange confined to
//! its own connection: connect, write the request, half-close the write
//! side, read until the peer closes. No Content-Length framing and no
//! multiplexing; EOF is the frame boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::utils::error::SkFindError;
use crate::workspace::WorkspaceKind;

/// A request from client to daemon.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireRequest {
    /// Opaque correlation token, echoed back in the response.
    pub id: Value,

    pub method: Method,

    #[serde(default)]
    pub parameters: RequestParameters,
}

impl WireRequest {
    /// Create a request with an auto-generated correlation token.
    pub fn new(method: Method, parameters: RequestParameters) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self { id: Value::from(NEXT_ID.fetch_add(1, Ordering::SeqCst)), method, parameters }
    }
}

/// Supported daemon methods.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Definition and hover merged into one SymbolInfo.
    Inspect,
    /// Where the symbol at a position is defined.
    Definition,
    /// Signature and documentation at a position.
    Hover,
    /// Search symbols by name across the workspace.
    SymbolSearch,
    /// Health check: verify the daemon is responsive.
    Ping,
    /// Snapshot of the daemon and its live sessions.
    Status,
    /// Gracefully shut the daemon down.
    Shutdown,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Definition => "definition",
            Self::Hover => "hover",
            Self::SymbolSearch => "symbolSearch",
            Self::Ping => "ping",
            Self::Status => "status",
            Self::Shutdown => "shutdown",
        }
    }

    /// Server-control methods are handled by the supervisor and never reach
    /// the session pool.
    pub fn is_server_control(self) -> bool {
        matches!(self, Self::Ping | Self::Status | Self::Shutdown)
    }
}

/// Method parameters. One flat bag for every method; each handler validates
/// the fields it needs.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrich: Option<bool>,
}

/// A response from daemon to client. Exactly one of `result`,
/// `symbol_results`, `status`, or `error` is populated.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub id: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SymbolInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_results: Option<Vec<SymbolSearchResult>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DaemonStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireResponse {
    pub fn result(id: Value, result: SymbolInfo) -> Self {
        Self { id, result: Some(result), symbol_results: None, status: None, error: None }
    }

    pub fn symbol_results(id: Value, results: Vec<SymbolSearchResult>) -> Self {
        Self { id, result: None, symbol_results: Some(results), status: None, error: None }
    }

    pub fn status(id: Value, status: DaemonStatus) -> Self {
        Self { id, result: None, symbol_results: None, status: Some(status), error: None }
    }

    pub fn error(id: Value, error: &SkFindError) -> Self {
        Self {
            id,
            result: None,
            symbol_results: None,
            status: None,
            error: Some(WireError { code: error.code().to_string(), message: error.to_string() }),
        }
    }
}

/// Stable error code plus human-readable message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

/// Where a symbol is defined. Lines and characters are 1-based.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionLocation {
    pub uri: String,
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,

    /// Best-effort source excerpt at the definition's line range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Everything known about one symbol. All fields optional; a partial
/// result is valid.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionLocation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl SymbolInfo {
    /// Merge per the inspect rules: `self` (hover) wins for name, kind,
    /// module, and signature; `other` (definition) always wins for the
    /// definition location.
    pub fn merged_over(self, other: Self) -> Self {
        Self {
            name: self.name.or(other.name),
            kind: self.kind.or(other.kind),
            module: self.module.or(other.module),
            definition: other.definition.or(self.definition),
            signature: self.signature.or(other.signature),
            documentation: self.documentation.or(other.documentation),
        }
    }
}

/// One symbol-search hit. Enrichment merges non-null SymbolInfo fields over
/// the un-enriched entry, best effort.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSearchResult {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionLocation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// Daemon snapshot for ping/status.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub socket_path: String,
    pub idle_timeout_secs: u64,
    pub log_path: String,
    /// Sorted by workspace root path for determinism.
    pub sessions: Vec<SessionStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub workspace_root_path: String,
    pub kind: WorkspaceKind,
    /// ISO-8601 timestamp of the last successful symbol operation.
    pub last_used: String,
}
