use thiserror::Error;

/// Failure taxonomy for sourcekit-find.
///
/// Every variant that can cross the daemon wire carries a stable string
/// code (see [`SkFindError::code`]); the daemon serializes `{code, message}`
/// and the client reconstructs the variant with [`SkFindError::from_wire`].
#[derive(Error, Debug)]
pub enum SkFindError {
    #[error("No Swift workspace found for: {path}")]
    WorkspaceNotFound { path: String },

    #[error("Ambiguous workspace root (multiple project bundles): {path}")]
    WorkspaceAmbiguous { path: String },

    #[error("Not a Swift workspace root: {path}")]
    UnsupportedWorkspace { path: String },

    #[error("Symbol not found: {query}")]
    SymbolNotFound { query: String },

    #[error("sourcekit-lsp failed to launch: {message}")]
    LspLaunchFailed { message: String },

    #[error("sourcekit-lsp initialization failed: {message}")]
    LspInitializationFailed { message: String },

    #[error("Invalid position: line {line}, column {column} (positions are 1-based)")]
    InvalidPosition { line: u32, column: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to decode request: {message}")]
    DecodeError { message: String },

    #[error("Unsupported method: {method}")]
    UnsupportedMethod { method: String },

    #[error("Daemon error: {message}")]
    ServerError { message: String },

    #[error("Daemon response carried neither result nor error")]
    NoResult,

    /// Client-side only: a read deadline elapsed. Distinguishable from
    /// ordinary I/O errors so the reachability diagnosis can tell a wedged
    /// daemon apart from a stale socket.
    #[error("Timed out waiting for: {operation}")]
    TimedOut { operation: String },

    /// Client-side only: the daemon could not be made reachable. Callers
    /// fall back to a direct one-shot session instead of failing.
    #[error("Daemon unavailable: {message}")]
    DaemonUnavailable { message: String },
}

impl SkFindError {
    /// Stable code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkspaceNotFound { .. } => "workspace_not_found",
            Self::WorkspaceAmbiguous { .. } => "workspace_ambiguous",
            Self::UnsupportedWorkspace { .. } => "unsupported_workspace",
            Self::SymbolNotFound { .. } => "symbol_not_found",
            Self::LspLaunchFailed { .. } => "lsp_launch_failed",
            Self::LspInitializationFailed { .. } => "lsp_initialization_failed",
            Self::Io(_) | Self::Json(_) | Self::TimedOut { .. } => "io_error",
            // A bad position is a malformed request, not a transport fault;
            // clients must not treat it as retryable.
            Self::InvalidPosition { .. } | Self::DecodeError { .. } => "decode_error",
            Self::UnsupportedMethod { .. } => "unsupported_method",
            Self::ServerError { .. } | Self::DaemonUnavailable { .. } => "server_error",
            Self::NoResult => "no_result",
        }
    }

    /// Rebuild a taxonomy variant from a wire `{code, message}` pair.
    ///
    /// Unknown codes collapse into `ServerError` so a newer daemon never
    /// crashes an older client.
    pub fn from_wire(code: &str, message: &str) -> Self {
        let message = message.to_string();
        match code {
            "workspace_not_found" => Self::WorkspaceNotFound { path: message },
            "workspace_ambiguous" => Self::WorkspaceAmbiguous { path: message },
            "unsupported_workspace" => Self::UnsupportedWorkspace { path: message },
            "symbol_not_found" => Self::SymbolNotFound { query: message },
            "lsp_launch_failed" => Self::LspLaunchFailed { message },
            "lsp_initialization_failed" => Self::LspInitializationFailed { message },
            "decode_error" => Self::DecodeError { message },
            "unsupported_method" => Self::UnsupportedMethod { method: message },
            _ => Self::ServerError { message },
        }
    }

    /// True for failures of the transport itself (as opposed to a
    /// well-formed error response). These trigger reachability diagnosis
    /// rather than being reported to the caller.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::TimedOut { .. })
    }
}

pub type Result<T, E = SkFindError> = std::result::Result<T, E>;
