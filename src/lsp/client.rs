use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use crate::lsp::protocol::{
    DefinitionResponse, GotoDefinitionParams, Hover, HoverRequestParams, Location, LspRequest,
    LspResponse, Position, SymbolMatch, TextDocumentIdentifier, TextDocumentPositionParams,
    WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use crate::lsp::server::SourceKitLspServer;
use crate::utils::error::{Result, SkFindError};

/// Stdio JSON-RPC client for one sourcekit-lsp process.
pub struct SourceKitLspClient {
    /// Kept alive so the child process is killed when the client is dropped.
    _server: SourceKitLspServer,
    stdin: tokio::sync::Mutex<tokio::process::ChildStdin>,
    request_id: AtomicU64,
    pending_requests: Arc<Mutex<HashMap<u64, oneshot::Sender<LspResponse>>>>,
    /// URIs of documents already sent via `textDocument/didOpen`.
    /// Duplicate opens violate LSP protocol and trigger a re-analysis window
    /// in which position queries return null.
    opened_documents: Mutex<HashSet<String>>,
    /// Flipped when the server's stdout reaches EOF, meaning the process exited.
    /// Checked lazily by the session before each use.
    closed: Arc<AtomicBool>,
}

/// Build a `file://` URI from a file path, canonicalizing it first.
async fn file_uri(file_path: &str) -> Result<String> {
    let canonical = tokio::fs::canonicalize(file_path).await.map_err(SkFindError::Io)?;
    Ok(format!("file://{}", canonical.display()))
}

impl SourceKitLspClient {
    pub async fn new(workspace_root: &str) -> Result<Self> {
        let mut server = SourceKitLspServer::start(workspace_root).await?;

        let stdin = server.take_stdin();
        let stdout = server.take_stdout();

        let client = Self {
            _server: server,
            stdin: tokio::sync::Mutex::new(stdin),
            request_id: AtomicU64::new(1),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            opened_documents: Mutex::new(HashSet::new()),
            closed: Arc::new(AtomicBool::new(false)),
        };

        // Must start reading responses before sending initialize,
        // otherwise the initialize response is never consumed and we deadlock.
        client.start_response_handler(stdout);
        tracing::debug!("Sending LSP initialize request...");
        client.initialize(workspace_root).await.map_err(|e| {
            SkFindError::LspInitializationFailed { message: e.to_string() }
        })?;
        tracing::debug!("sourcekit-lsp client initialized");
        Ok(client)
    }

    /// True once the underlying process has exited. The session treats this
    /// as a reset to the unconnected state on its next request, not an error.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn initialize(&self, workspace_root: &str) -> Result<()> {
        let init_params = serde_json::json!({
            "processId": std::process::id(),
            "rootPath": workspace_root,
            "rootUri": format!("file://{workspace_root}"),
            "capabilities": {
                "textDocument": {
                    "definition": {
                        "dynamicRegistration": false,
                        "linkSupport": true
                    },
                    "hover": {
                        "dynamicRegistration": false,
                        "contentFormat": ["markdown", "plaintext"]
                    }
                },
                "workspace": {
                    "symbol": {
                        "dynamicRegistration": false
                    }
                }
            }
        });

        let _response = self.send_request("initialize", init_params).await?;

        self.send_notification("initialized", serde_json::json!({})).await?;

        Ok(())
    }

    /// Open a document and return whether it was newly opened.
    ///
    /// Idempotent: exactly one `didOpen` per URI, tracked in
    /// `opened_documents`. The URI is only marked open after the read and
    /// the notification both succeed; a failed open must stay retryable,
    /// otherwise the server never receives the document and every later
    /// position query against it returns null.
    pub async fn open_document(&self, file_path: &str) -> Result<bool> {
        let uri = file_uri(file_path).await?;

        {
            let opened = self.opened_documents.lock().expect("opened_documents mutex poisoned");
            if opened.contains(&uri) {
                tracing::debug!("open_document: already open, skipping didOpen for {uri}");
                return Ok(false);
            }
        }

        let text = tokio::fs::read_to_string(file_path).await.map_err(SkFindError::Io)?;

        self.send_notification(
            "textDocument/didOpen",
            serde_json::json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "swift",
                    "version": 1,
                    "text": text
                }
            }),
        )
        .await?;

        self.opened_documents
            .lock()
            .expect("opened_documents mutex poisoned")
            .insert(uri);

        Ok(true)
    }

    pub async fn goto_definition(
        &self,
        file_path: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<Location>> {
        let uri = file_uri(file_path).await?;

        let params = GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
        };

        let response =
            self.send_request("textDocument/definition", serde_json::to_value(params)?).await?;

        let Some(value) = response.result else {
            return Ok(vec![]);
        };
        if value.is_null() {
            return Ok(vec![]);
        }

        match serde_json::from_value::<DefinitionResponse>(value)? {
            DefinitionResponse::Single(loc) => Ok(vec![loc]),
            DefinitionResponse::Many(locs) => Ok(locs),
            DefinitionResponse::Links(links) => Ok(links
                .into_iter()
                .map(|l| Location { uri: l.target_uri, range: l.target_selection_range })
                .collect()),
        }
    }

    pub async fn hover(&self, file_path: &str, line: u32, character: u32) -> Result<Option<Hover>> {
        let uri = file_uri(file_path).await?;

        let params = HoverRequestParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character },
            },
        };

        let response =
            self.send_request("textDocument/hover", serde_json::to_value(params)?).await?;

        match response.result {
            Some(value) if !value.is_null() => {
                let hover: Hover = serde_json::from_value(value)?;
                Ok(Some(hover))
            }
            _ => Ok(None),
        }
    }

    pub async fn workspace_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        let params = WorkspaceSymbolParams { query: query.to_string() };

        let response = self.send_request("workspace/symbol", serde_json::to_value(params)?).await?;

        match response.result {
            Some(value) if value.is_array() => {
                let parsed: WorkspaceSymbolResponse = serde_json::from_value(value)?;
                Ok(parsed.into_matches())
            }
            _ => Ok(vec![]),
        }
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<LspResponse> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending =
                self.pending_requests.lock().expect("pending_requests mutex poisoned");
            pending.insert(id, tx);
        }

        let request = LspRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::Number(id.into()),
            method: method.to_string(),
            params,
        };

        tracing::debug!("Sending LSP request: {method} (id: {id})");
        self.send_message(&request).await?;

        let response = rx.await.map_err(|_| SkFindError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "LSP response channel closed (process exited?)",
        )))?;

        if let Some(ref error) = response.error {
            tracing::debug!("LSP error response for {method} (id: {id}): {error:?}");
        } else {
            tracing::debug!("LSP response received for {method} (id: {id})");
        }

        Ok(response)
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<()> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        self.send_raw_message(&notification.to_string()).await
    }

    async fn send_message<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        let content = serde_json::to_string(message)?;
        self.send_raw_message(&content).await
    }

    async fn send_raw_message(&self, content: &str) -> Result<()> {
        let message = format!("Content-Length: {}\r\n\r\n{content}", content.len());
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(message.as_bytes()).await.map_err(SkFindError::Io)?;
        stdin.flush().await.map_err(SkFindError::Io)?;
        Ok(())
    }

    fn start_response_handler(&self, stdout: BufReader<tokio::process::ChildStdout>) {
        let pending_requests = Arc::clone(&self.pending_requests);
        let closed = Arc::clone(&self.closed);

        // JoinHandle intentionally not stored; the task exits naturally when
        // the server's stdout closes (EOF), which happens when the child
        // process dies or is killed on drop.
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut buffer = String::new();
            let mut content_length: Option<usize> = None;

            loop {
                buffer.clear();
                match stdout.read_line(&mut buffer).await {
                    Ok(0) => {
                        tracing::debug!("sourcekit-lsp stdout closed (EOF)");
                        break;
                    }
                    Ok(_) => {
                        if buffer.starts_with("Content-Length:") {
                            if let Some(len_str) =
                                buffer.strip_prefix("Content-Length:").map(str::trim)
                            {
                                content_length = len_str.parse().ok();
                            }
                        } else if buffer.trim().is_empty() {
                            if let Some(len) = content_length.take() {
                                let mut content = vec![0; len];
                                if stdout.read_exact(&mut content).await.is_ok() {
                                    Self::route_response(&pending_requests, &content);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!("sourcekit-lsp stdout read error: {e}");
                        break;
                    }
                }
            }

            closed.store(true, Ordering::Release);
            // Unblock any requests still waiting; their senders drop here.
            pending_requests.lock().expect("pending_requests mutex poisoned").clear();
        });
    }

    fn route_response(
        pending_requests: &Arc<Mutex<HashMap<u64, oneshot::Sender<LspResponse>>>>,
        content: &[u8],
    ) {
        let Ok(response_str) = std::str::from_utf8(content) else {
            return;
        };
        let Ok(response) = serde_json::from_str::<LspResponse>(response_str) else {
            // Server-initiated notifications land here too; ignore them.
            tracing::trace!(
                "Ignoring non-response LSP message: {}",
                response_str.chars().take(200).collect::<String>()
            );
            return;
        };
        if let Value::Number(id_num) = &response.id {
            if let Some(id) = id_num.as_u64() {
                let mut pending =
                    pending_requests.lock().expect("pending_requests mutex poisoned");
                if let Some(sender) = pending.remove(&id) {
                    let _ = sender.send(response);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    /// Client backed by `cat` instead of sourcekit-lsp: writes succeed,
    /// and its echoed output is discarded as non-response traffic.
    async fn stub_client() -> SourceKitLspClient {
        let process = tokio::process::Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn cat");
        let mut server = SourceKitLspServer::wrapping(process);
        let stdin = server.take_stdin();
        let stdout = server.take_stdout();

        let client = SourceKitLspClient {
            _server: server,
            stdin: tokio::sync::Mutex::new(stdin),
            request_id: AtomicU64::new(1),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            opened_documents: Mutex::new(HashSet::new()),
            closed: Arc::new(AtomicBool::new(false)),
        };
        client.start_response_handler(stdout);
        client
    }

    #[tokio::test]
    async fn test_failed_open_stays_retryable() {
        let client = stub_client().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Doc.swift");

        // A directory canonicalizes fine but cannot be read as a document.
        std::fs::create_dir(&path).expect("mkdir");
        let err = client
            .open_document(path.to_str().expect("utf8"))
            .await
            .expect_err("directory is not a readable document");
        assert!(matches!(err, SkFindError::Io(_)));

        // Same canonical path, now a real file: the open must go through,
        // not be skipped as already-open.
        std::fs::remove_dir(&path).expect("rmdir");
        std::fs::write(&path, "struct Doc {}\n").expect("write");
        assert!(
            client.open_document(path.to_str().expect("utf8")).await.expect("open"),
            "first successful open must send didOpen"
        );
        assert!(
            !client.open_document(path.to_str().expect("utf8")).await.expect("reopen"),
            "second open of the same document is a no-op"
        );
    }

    #[tokio::test]
    async fn test_closed_flag_set_on_child_exit() {
        let client = stub_client().await;
        assert!(!client.is_closed());

        // Killing the child closes its stdout; the response handler sees EOF.
        let pid = client._server.pid().expect("child pid");
        // SAFETY: plain kill(2) on a child we spawned.
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !client.is_closed() && std::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(client.is_closed(), "EOF on stdout must flip the closed flag");
    }
}
