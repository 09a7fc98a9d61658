//! Command handlers: daemon-first, with a direct one-shot session as the
//! fallback when the daemon cannot be made reachable.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::args::DaemonAction;
use crate::cli::output::OutputFormatter;
use crate::config::RuntimePaths;
use crate::daemon::client::DaemonClient;
use crate::daemon::protocol::{RequestParameters, SymbolInfo, SymbolSearchResult};
use crate::daemon::server::{DaemonServer, DEFAULT_IDLE_TIMEOUT};
use crate::lsp::session::AnalysisSession;
use crate::utils::error::SkFindError;
use crate::workspace;

/// Which position operation to run; inspect is definition + hover merged.
#[derive(Clone, Copy)]
pub enum PositionOp {
    Inspect,
    Definition,
    Hover,
}

pub async fn handle_position_command(
    op: PositionOp,
    workspace_root: Option<&Path>,
    file: &Path,
    line: u32,
    column: u32,
    timeout: Option<std::time::Duration>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("file not found: {}", file.display()))?;
    let params = RequestParameters {
        workspace_root_path: workspace_root.map(Path::to_path_buf),
        file_path: Some(file.clone()),
        line: Some(line),
        column: Some(column),
        ..RequestParameters::default()
    };

    let paths = RuntimePaths::resolve()?;
    let client = DaemonClient::new(paths).with_timeout(timeout);

    let result = match op {
        PositionOp::Inspect => client.inspect(params).await,
        PositionOp::Definition => client.definition(params).await,
        PositionOp::Hover => client.hover(params).await,
    };

    let info = match result {
        Ok(info) => info,
        Err(SkFindError::DaemonUnavailable { message }) => {
            tracing::warn!("daemon unavailable ({message}); running a direct session");
            direct_position_op(op, workspace_root, &file, line, column).await?
        }
        Err(e) => return Err(e.into()),
    };

    let query_info = format!("{}:{line}:{column}", file.display());
    print!("{}", formatter.format_symbol_info(&info, &query_info));
    Ok(())
}

pub async fn handle_search_command(
    workspace_root: Option<&Path>,
    query: &str,
    limit: Option<usize>,
    enrich: bool,
    timeout: Option<std::time::Duration>,
    formatter: &OutputFormatter,
) -> Result<()> {
    // Search has no file to anchor workspace detection, so the current
    // directory stands in when no explicit root is given.
    let anchor = match workspace_root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let params = RequestParameters {
        workspace_root_path: Some(anchor.clone()),
        query: Some(query.to_string()),
        limit,
        enrich: Some(enrich),
        ..RequestParameters::default()
    };

    let paths = RuntimePaths::resolve()?;
    let client = DaemonClient::new(paths).with_timeout(timeout);

    let results = match client.symbol_search(params).await {
        Ok(results) => results,
        Err(SkFindError::DaemonUnavailable { message }) => {
            tracing::warn!("daemon unavailable ({message}); running a direct session");
            direct_search(workspace_root, &anchor, query, limit, enrich).await?
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", formatter.format_search_results(&results, query));
    Ok(())
}

pub async fn handle_daemon_command(
    action: &DaemonAction,
    formatter: &OutputFormatter,
) -> Result<()> {
    let paths = RuntimePaths::resolve()?;

    match action {
        DaemonAction::Start { foreground: true } => {
            let server = DaemonServer::new(paths, DEFAULT_IDLE_TIMEOUT);
            server.run().await
        }
        DaemonAction::Start { foreground: false } => {
            let client = DaemonClient::new(paths);
            if client.ping().await.is_ok() {
                println!("daemon already running");
                return Ok(());
            }
            client.ensure_reachable().await.context("starting daemon")?;
            println!("daemon started");
            Ok(())
        }
        DaemonAction::Stop => {
            let client = DaemonClient::new(paths);
            if !client.socket_exists() {
                println!("daemon not running");
                return Ok(());
            }
            match client.shutdown().await {
                Ok(()) => {
                    println!("daemon stopped");
                    Ok(())
                }
                Err(e) if e.is_transport() => {
                    // Nothing answered behind the socket; treat as already
                    // stopped.
                    println!("daemon not running (stale socket)");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        DaemonAction::Status => {
            let client = DaemonClient::new(paths);
            match client.status().await {
                Ok(status) => {
                    print!("{}", formatter.format_status(&status));
                    Ok(())
                }
                Err(e) if e.is_transport() => {
                    println!("daemon not running");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// One-shot session for a position query, bypassing the daemon entirely.
async fn direct_position_op(
    op: PositionOp,
    workspace_root: Option<&Path>,
    file: &Path,
    line: u32,
    column: u32,
) -> Result<SymbolInfo, SkFindError> {
    let key = workspace::resolve(workspace_root, file)?;
    let session = AnalysisSession::new(key);
    let file = file.display().to_string();

    let result = match op {
        PositionOp::Inspect => session.inspect(&file, line, column).await,
        PositionOp::Definition => session.definition(&file, line, column).await,
        PositionOp::Hover => session.hover(&file, line, column).await,
    };
    session.shutdown().await;
    result
}

async fn direct_search(
    workspace_root: Option<&Path>,
    anchor: &Path,
    query: &str,
    limit: Option<usize>,
    enrich: bool,
) -> Result<Vec<SymbolSearchResult>, SkFindError> {
    let key = workspace::resolve(workspace_root, anchor)?;
    let session = AnalysisSession::new(key);
    let result = session.search_symbols(query, limit, enrich).await;
    session.shutdown().await;
    result
}
