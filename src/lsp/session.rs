//! One workspace's session with the external analysis process.
//!
//! The session owns the connection lazily: nothing is spawned until the
//! first symbol operation, and a connection whose process has exited is
//! silently re-established on the next request (the generation counter
//! increments on every (re)start so tests can observe restarts).

use std::sync::Arc;
use std::time::Duration;

use crate::daemon::protocol::{DefinitionLocation, SymbolInfo, SymbolSearchResult};
use crate::lsp::client::SourceKitLspClient;
use crate::lsp::protocol::{Location, SymbolMatch};
use crate::utils::error::{Result, SkFindError};
use crate::workspace::{WorkspaceKey, WorkspaceKind};

/// How long to keep retrying while the analysis process's index warms up.
///
/// This table is the one place where empirical knowledge about warm-up
/// behavior lives. Manifest-package roots resolve dependencies before the
/// index is usable, so they get a much longer budget than IDE roots, where
/// the build-server handshake is quick once present.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn for_kind(kind: WorkspaceKind) -> Self {
        match kind {
            WorkspaceKind::ManifestPackage => {
                Self { attempts: 15, delay: Duration::from_millis(800) }
            }
            WorkspaceKind::IdeProject | WorkspaceKind::IdeWorkspace => {
                Self { attempts: 5, delay: Duration::from_millis(350) }
            }
        }
    }
}

/// Maximum lines included in a definition snippet.
const SNIPPET_MAX_LINES: usize = 8;

struct ConnState {
    client: Option<Arc<SourceKitLspClient>>,
    /// Incremented each time the underlying process is (re)started.
    generation: u64,
}

pub struct AnalysisSession {
    key: WorkspaceKey,
    policy: RetryPolicy,
    state: tokio::sync::Mutex<ConnState>,
}

impl AnalysisSession {
    pub fn new(key: WorkspaceKey) -> Self {
        let policy = RetryPolicy::for_kind(key.kind);
        Self { key, policy, state: tokio::sync::Mutex::new(ConnState { client: None, generation: 0 }) }
    }

    pub fn key(&self) -> &WorkspaceKey {
        &self.key
    }

    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Get the live client, (re)connecting lazily.
    ///
    /// A client whose process exited is treated as a reset to the
    /// unconnected state, not an error.
    async fn client(&self) -> Result<Arc<SourceKitLspClient>> {
        let mut state = self.state.lock().await;

        if let Some(client) = &state.client {
            if client.is_closed() {
                tracing::info!(
                    "analysis process for {} exited; restarting",
                    self.key.root.display()
                );
                state.client = None;
            } else {
                return Ok(Arc::clone(client));
            }
        }

        let root = self.key.root.to_string_lossy();
        let client = Arc::new(SourceKitLspClient::new(&root).await?);
        state.generation += 1;
        state.client = Some(Arc::clone(&client));
        tracing::debug!(
            "session for {} connected (generation {})",
            self.key.root.display(),
            state.generation
        );
        Ok(client)
    }

    /// Disconnect, killing the underlying process. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.client.take().is_some() {
            tracing::debug!("session for {} disconnected", self.key.root.display());
        }
    }

    /// Validate a 1-based wire position and convert it to LSP 0-based.
    fn check_position(line: u32, column: u32) -> Result<(u32, u32)> {
        if line == 0 || column == 0 {
            return Err(SkFindError::InvalidPosition { line, column });
        }
        Ok((line - 1, column - 1))
    }

    /// Where the symbol at `(line, column)` (1-based) is defined.
    pub async fn definition(&self, file_path: &str, line: u32, column: u32) -> Result<SymbolInfo> {
        let (line0, col0) = Self::check_position(line, column)?;
        let client = self.client().await?;
        client.open_document(file_path).await?;

        let mut locations = client.goto_definition(file_path, line0, col0).await?;
        let mut attempt = 0;
        while locations.is_empty() && attempt < self.policy.attempts {
            attempt += 1;
            tracing::debug!("definition empty, retry {attempt}/{}", self.policy.attempts);
            tokio::time::sleep(self.policy.delay).await;
            locations = client.goto_definition(file_path, line0, col0).await?;
        }

        let Some(location) = locations.into_iter().next() else {
            return Err(SkFindError::SymbolNotFound {
                query: format!("{file_path}:{line}:{column}"),
            });
        };

        Ok(SymbolInfo {
            definition: Some(to_definition_location(&location)),
            ..SymbolInfo::default()
        })
    }

    /// Signature and documentation at `(line, column)` (1-based).
    pub async fn hover(&self, file_path: &str, line: u32, column: u32) -> Result<SymbolInfo> {
        let (line0, col0) = Self::check_position(line, column)?;
        let client = self.client().await?;
        client.open_document(file_path).await?;

        let mut hover = client.hover(file_path, line0, col0).await?;
        let mut attempt = 0;
        while hover.is_none() && attempt < self.policy.attempts {
            attempt += 1;
            tracing::debug!("hover empty, retry {attempt}/{}", self.policy.attempts);
            tokio::time::sleep(self.policy.delay).await;
            hover = client.hover(file_path, line0, col0).await?;
        }

        let Some(hover) = hover else {
            return Err(SkFindError::SymbolNotFound {
                query: format!("{file_path}:{line}:{column}"),
            });
        };

        Ok(symbol_info_from_hover(&hover.contents.as_text()))
    }

    /// Union of definition and hover: hover wins for name/kind/module and
    /// signature, definition always wins for the location.
    pub async fn inspect(&self, file_path: &str, line: u32, column: u32) -> Result<SymbolInfo> {
        let definition = match self.definition(file_path, line, column).await {
            Ok(info) => Some(info),
            Err(SkFindError::SymbolNotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let hover = match self.hover(file_path, line, column).await {
            Ok(info) => Some(info),
            Err(SkFindError::SymbolNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        match (hover, definition) {
            (Some(h), Some(d)) => Ok(h.merged_over(d)),
            (Some(h), None) => Ok(h),
            (None, Some(d)) => Ok(d),
            (None, None) => Err(SkFindError::SymbolNotFound {
                query: format!("{file_path}:{line}:{column}"),
            }),
        }
    }

    /// Search symbols by name across the workspace.
    ///
    /// Both workspace-symbol response shapes are flattened into one result
    /// shape. With `enrich`, each result is augmented best effort by a
    /// definition+hover pair at its location; individual enrichment
    /// failures leave the un-enriched entry in place.
    pub async fn search_symbols(
        &self,
        query: &str,
        limit: Option<usize>,
        enrich: bool,
    ) -> Result<Vec<SymbolSearchResult>> {
        let client = self.client().await?;

        let mut matches = client.workspace_symbols(query).await?;
        let mut attempt = 0;
        while matches.is_empty() && attempt < self.policy.attempts {
            attempt += 1;
            tracing::debug!("symbol search empty, retry {attempt}/{}", self.policy.attempts);
            tokio::time::sleep(self.policy.delay).await;
            matches = client.workspace_symbols(query).await?;
        }

        if matches.is_empty() {
            return Err(SkFindError::SymbolNotFound { query: query.to_string() });
        }

        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        let mut results: Vec<SymbolSearchResult> =
            matches.iter().map(to_search_result).collect();

        if enrich {
            for result in &mut results {
                self.enrich_result(&client, result).await;
            }
        }

        Ok(results)
    }

    /// Augment one search hit with a single-shot definition+hover pair.
    /// Failures are swallowed; partial results beat none.
    async fn enrich_result(&self, client: &SourceKitLspClient, result: &mut SymbolSearchResult) {
        let Some(definition) = &result.definition else {
            return;
        };
        let Some(file_path) = local_path(&definition.uri) else {
            return;
        };

        // Workspace-symbol ranges point at the declaration keyword; hover
        // needs the cursor on the name itself.
        let line0 = definition.start_line - 1;
        let column0 = find_name_column(&file_path, line0, &result.name)
            .unwrap_or(definition.start_character - 1);

        if client.open_document(&file_path).await.is_err() {
            return;
        }

        if let Ok(locations) = client.goto_definition(&file_path, line0, column0).await {
            if let Some(location) = locations.first() {
                result.definition = Some(to_definition_location(location));
            }
        }

        if let Ok(Some(hover)) = client.hover(&file_path, line0, column0).await {
            let info = symbol_info_from_hover(&hover.contents.as_text());
            if info.signature.is_some() {
                result.signature = info.signature;
            }
            if info.documentation.is_some() {
                result.documentation = info.documentation;
            }
            if result.kind.is_none() {
                result.kind = info.kind;
            }
        }
    }
}

/// Strip `file://` from a URI; `None` for anything that is not a local file.
fn local_path(uri: &str) -> Option<String> {
    uri.strip_prefix("file://").map(ToString::to_string)
}

/// Convert an LSP location (0-based) to a wire location (1-based) with a
/// best-effort snippet.
fn to_definition_location(location: &Location) -> DefinitionLocation {
    let start_line = location.range.start.line + 1;
    let end_line = location.range.end.line + 1;
    let snippet = local_path(&location.uri)
        .and_then(|path| read_snippet(&path, start_line, end_line));

    DefinitionLocation {
        uri: location.uri.clone(),
        start_line,
        start_character: location.range.start.character + 1,
        end_line,
        end_character: location.range.end.character + 1,
        snippet,
    }
}

/// Read the source lines of a definition (1-based, inclusive). Skipped
/// silently when the target is unreadable.
fn read_snippet(path: &str, start_line: u32, end_line: u32) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let start = (start_line as usize).checked_sub(1)?;
    let count = (end_line as usize).saturating_sub(start).min(SNIPPET_MAX_LINES).max(1);
    let lines: Vec<&str> = content.lines().skip(start).take(count).collect();
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

fn to_search_result(m: &SymbolMatch) -> SymbolSearchResult {
    let definition = m.range.map(|range| {
        to_definition_location(&Location { uri: m.uri.clone(), range })
    });
    SymbolSearchResult {
        name: m.name.clone(),
        kind: Some(m.kind.label().to_string()),
        module: m.container_name.clone(),
        definition,
        signature: None,
        documentation: None,
    }
}

/// Find the column (0-based) where `name` appears on a 0-based line of a
/// file. Declaration ranges start at the keyword (`func`, `class`), but
/// hover needs the name itself.
fn find_name_column(file_path: &str, line0: u32, name: &str) -> Option<u32> {
    let content = std::fs::read_to_string(file_path).ok()?;
    let src_line = content.lines().nth(line0 as usize)?;
    src_line.find(name).and_then(|col| u32::try_from(col).ok())
}

/// Parse a hover markdown blob into SymbolInfo fields.
///
/// sourcekit-lsp hovers look like:
/// ```text
/// ```swift
/// func greet(name: String) -> String
/// ```
/// ---
/// Greets someone by name.
/// ```
fn symbol_info_from_hover(text: &str) -> SymbolInfo {
    let (code_part, doc_part) = match text.find("\n---") {
        Some(pos) => (&text[..pos], Some(text[pos + 4..].trim())),
        None => (text, None),
    };

    let trimmed = code_part.trim();
    let signature = trimmed
        .strip_prefix("```swift")
        .or_else(|| trimmed.strip_prefix("```text"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let signature = signature.trim().strip_suffix("```").unwrap_or(signature).trim();

    let (name, kind) = swift_declaration_parts(signature);

    SymbolInfo {
        name,
        kind,
        module: None,
        definition: None,
        signature: if signature.is_empty() { None } else { Some(signature.to_string()) },
        documentation: doc_part.filter(|d| !d.is_empty()).map(ToString::to_string),
    }
}

/// Pull the declared name and kind out of a Swift signature line.
fn swift_declaration_parts(signature: &str) -> (Option<String>, Option<String>) {
    let keywords: &[(&str, &str)] = &[
        ("func ", "function"),
        ("class ", "class"),
        ("struct ", "struct"),
        ("enum ", "enum"),
        ("protocol ", "protocol"),
        ("actor ", "actor"),
        ("typealias ", "type alias"),
        ("var ", "variable"),
        ("let ", "constant"),
        ("init", "initializer"),
    ];

    // Skip access modifiers and the like.
    let mut rest = signature;
    for modifier in ["public ", "private ", "internal ", "open ", "fileprivate ", "static ", "final "]
    {
        while let Some(stripped) = rest.strip_prefix(modifier) {
            rest = stripped;
        }
    }

    for (keyword, kind) in keywords {
        if let Some(after) = rest.strip_prefix(keyword) {
            let name: String = after
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            let name = if name.is_empty() { None } else { Some(name) };
            return (name, Some((*kind).to_string()));
        }
    }

    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session(kind: WorkspaceKind) -> AnalysisSession {
        AnalysisSession::new(WorkspaceKey { root: PathBuf::from("/repo"), kind })
    }

    #[test]
    fn test_retry_policy_per_kind() {
        let manifest = RetryPolicy::for_kind(WorkspaceKind::ManifestPackage);
        assert_eq!(manifest.attempts, 15);
        assert_eq!(manifest.delay, Duration::from_millis(800));

        let project = RetryPolicy::for_kind(WorkspaceKind::IdeProject);
        assert_eq!(project.attempts, 5);
        assert_eq!(project.delay, Duration::from_millis(350));

        let workspace = RetryPolicy::for_kind(WorkspaceKind::IdeWorkspace);
        assert_eq!(workspace.attempts, 5);
    }

    #[tokio::test]
    async fn test_invalid_position_rejected_before_connect() {
        // Line/column 0 must fail without ever spawning a process.
        let s = session(WorkspaceKind::ManifestPackage);
        let err = s.definition("/repo/A.swift", 0, 5).await.expect_err("line 0");
        assert!(matches!(err, SkFindError::InvalidPosition { .. }));

        let err = s.hover("/repo/A.swift", 3, 0).await.expect_err("column 0");
        assert!(matches!(err, SkFindError::InvalidPosition { .. }));
        assert_eq!(s.generation().await, 0);
    }

    #[tokio::test]
    async fn test_fresh_session_is_unconnected() {
        let s = session(WorkspaceKind::IdeProject);
        assert_eq!(s.generation().await, 0);
        s.shutdown().await;
        s.shutdown().await; // idempotent
        assert_eq!(s.generation().await, 0);
    }

    #[test]
    fn test_hover_parse_function() {
        let info = symbol_info_from_hover(
            "```swift\nfunc greet(name: String) -> String\n```\n---\nGreets someone by name.",
        );
        assert_eq!(info.signature.as_deref(), Some("func greet(name: String) -> String"));
        assert_eq!(info.documentation.as_deref(), Some("Greets someone by name."));
        assert_eq!(info.name.as_deref(), Some("greet"));
        assert_eq!(info.kind.as_deref(), Some("function"));
    }

    #[test]
    fn test_hover_parse_without_docs() {
        let info = symbol_info_from_hover("```swift\npublic struct Point\n```");
        assert_eq!(info.signature.as_deref(), Some("public struct Point"));
        assert!(info.documentation.is_none());
        assert_eq!(info.name.as_deref(), Some("Point"));
        assert_eq!(info.kind.as_deref(), Some("struct"));
    }

    #[test]
    fn test_hover_parse_plain_text() {
        let info = symbol_info_from_hover("let count: Int");
        assert_eq!(info.signature.as_deref(), Some("let count: Int"));
        assert_eq!(info.kind.as_deref(), Some("constant"));
        assert_eq!(info.name.as_deref(), Some("count"));
    }

    #[test]
    fn test_snippet_reads_definition_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("A.swift");
        std::fs::write(&file, "import Foundation\n\nstruct Point {\n    var x = 0\n}\n")
            .expect("write");

        let snippet = read_snippet(file.to_str().expect("utf8"), 3, 5).expect("snippet");
        assert!(snippet.starts_with("struct Point {"));
        assert!(snippet.ends_with('}'));

        assert!(read_snippet("/nonexistent/A.swift", 1, 1).is_none());
    }

    #[test]
    fn test_find_name_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("A.swift");
        std::fs::write(&file, "final class Animal {\n}\n").expect("write");

        assert_eq!(find_name_column(file.to_str().expect("utf8"), 0, "Animal"), Some(12));
        assert_eq!(find_name_column(file.to_str().expect("utf8"), 0, "Dog"), None);
    }
}
