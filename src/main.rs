use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod daemon;
mod lsp;
mod utils;
mod workspace;

use cli::args::{Cli, Commands};
use cli::output::OutputFormatter;
use commands::PositionOp;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The foreground daemon always logs; ordinary commands only with -v.
    let daemon_foreground =
        matches!(cli.command, Commands::Daemon { action: cli::args::DaemonAction::Start { foreground: true } });
    if cli.verbose || daemon_foreground {
        tracing_subscriber::fmt()
            .with_env_filter(if cli.verbose { "skf=debug" } else { "skf=info" })
            .with_writer(std::io::stderr)
            .init();
    }

    let formatter = OutputFormatter::new(cli.format);
    let workspace_root = cli.workspace.as_deref();
    let timeout = cli.timeout.map(std::time::Duration::from_secs);

    match &cli.command {
        Commands::Inspect { file, line, column } => {
            commands::handle_position_command(
                PositionOp::Inspect,
                workspace_root,
                file,
                *line,
                *column,
                timeout,
                &formatter,
            )
            .await
        }
        Commands::Definition { file, line, column } => {
            commands::handle_position_command(
                PositionOp::Definition,
                workspace_root,
                file,
                *line,
                *column,
                timeout,
                &formatter,
            )
            .await
        }
        Commands::Hover { file, line, column } => {
            commands::handle_position_command(
                PositionOp::Hover,
                workspace_root,
                file,
                *line,
                *column,
                timeout,
                &formatter,
            )
            .await
        }
        Commands::Search { query, limit, enrich } => {
            commands::handle_search_command(
                workspace_root,
                query,
                *limit,
                *enrich,
                timeout,
                &formatter,
            )
            .await
        }
        Commands::Daemon { action } => commands::handle_daemon_command(action, &formatter).await,
    }
}
