use clap::builder::styling::{AnsiColor, Styles};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::Cyan.on_default().bold())
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().bold());

const AFTER_HELP: &str = "\x1b[1;32mQuick Reference:\x1b[0m
  \x1b[1;36mExplore code at a specific location\x1b[0m (file + line + column, 1-based):
    skf inspect Sources/App.swift -l 42 -c 9     Definition + signature + docs in one shot
    skf definition Sources/App.swift -l 42 -c 9  Jump to where this symbol is defined
    skf hover Sources/App.swift -l 42 -c 9       Show signature and documentation

  \x1b[1;36mSearch symbols by name\x1b[0m (no file needed):
    skf search AppDelegate                        Find symbols across the workspace
    skf search User --limit 5 --enrich            Top 5 hits with signatures and docs

  \x1b[1;36mManage the background daemon\x1b[0m (started automatically on first use):
    skf daemon status                             Show live sessions
    skf daemon stop                               Shut the daemon down";

#[derive(Parser)]
#[command(name = "skf")]
#[command(about = "Resolve Swift symbol definitions and docs (powered by sourcekit-lsp)")]
#[command(version)]
#[command(styles = STYLES)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root (auto-detected from the file's ancestors if omitted)
    #[arg(long, value_name = "DIR", global = true)]
    pub workspace: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub format: OutputFormat,

    /// Timeout in seconds for daemon requests (default: 30)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Everything about the symbol at a position: definition + signature + docs
    #[command(
        long_about = "Everything known about the symbol at a file position in one answer: \
        where it is defined, its signature, and its documentation. The union of \
        'definition' and 'hover'.\n\n\
        Examples:\n  \
        skf inspect Sources/App.swift -l 42 -c 9\n  \
        skf --format json inspect Sources/App.swift -l 42 -c 9"
    )]
    Inspect {
        file: PathBuf,

        /// Line number (1-based)
        #[arg(short, long)]
        line: u32,

        /// Column number (1-based)
        #[arg(short, long)]
        column: u32,
    },

    /// Jump to where the symbol at a position is defined
    #[command(
        long_about = "Jump to where the symbol at a file position is defined. Prints the \
        target location and a source excerpt.\n\n\
        Examples:\n  \
        skf definition Sources/App.swift -l 42 -c 9"
    )]
    Definition {
        file: PathBuf,

        /// Line number (1-based)
        #[arg(short, long)]
        line: u32,

        /// Column number (1-based)
        #[arg(short, long)]
        column: u32,
    },

    /// Show the signature and documentation at a position
    #[command(
        long_about = "Show the declared signature and documentation comment for the symbol \
        at a file position.\n\n\
        Examples:\n  \
        skf hover Sources/App.swift -l 42 -c 9\n  \
        skf --format json hover Sources/App.swift -l 42 -c 9   # JSON for scripting"
    )]
    Hover {
        file: PathBuf,

        /// Line number (1-based)
        #[arg(short, long)]
        line: u32,

        /// Column number (1-based)
        #[arg(short, long)]
        column: u32,
    },

    /// Search symbols by name across the workspace
    #[command(
        long_about = "Search the workspace index for symbols matching a name. With --enrich, \
        each hit is augmented with its signature and documentation (slower: one extra \
        lookup per result).\n\n\
        Examples:\n  \
        skf search AppDelegate\n  \
        skf search User --limit 5 --enrich"
    )]
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Augment each result with signature and documentation
        #[arg(long, default_value_t = false)]
        enrich: bool,
    },

    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Start the daemon (normally happens automatically on first use)
    Start {
        /// Run in the foreground, logging to stderr (used internally for
        /// the background launch; handy for debugging)
        #[arg(long)]
        foreground: bool,
    },

    /// Ask a running daemon to shut down
    Stop,

    /// Show the daemon's socket, sessions, and last-used times
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_position_commands() {
        let cli = Cli::try_parse_from([
            "skf", "inspect", "Sources/App.swift", "-l", "42", "-c", "9",
        ])
        .expect("parse");
        match cli.command {
            Commands::Inspect { file, line, column } => {
                assert_eq!(file, PathBuf::from("Sources/App.swift"));
                assert_eq!((line, column), (42, 9));
            }
            _ => panic!("expected inspect"),
        }
    }

    #[test]
    fn test_cli_parses_search_flags() {
        let cli = Cli::try_parse_from(["skf", "search", "User", "-n", "5", "--enrich"])
            .expect("parse");
        match cli.command {
            Commands::Search { query, limit, enrich } => {
                assert_eq!(query, "User");
                assert_eq!(limit, Some(5));
                assert!(enrich);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "skf", "daemon", "status", "--format", "json", "--workspace", "/repo",
        ])
        .expect("parse");
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.workspace, Some(PathBuf::from("/repo")));
        assert!(matches!(cli.command, Commands::Daemon { action: DaemonAction::Status }));
    }

    #[test]
    fn test_position_requires_line_and_column() {
        assert!(Cli::try_parse_from(["skf", "hover", "App.swift", "-l", "3"]).is_err());
    }
}
