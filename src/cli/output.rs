use owo_colors::OwoColorize;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::cli::args::OutputFormat;
use crate::daemon::protocol::{DaemonStatus, DefinitionLocation, SymbolInfo, SymbolSearchResult};

pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
    cwd: PathBuf,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            color: supports_color::on(supports_color::Stream::Stdout).is_some(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    pub fn format_symbol_info(&self, info: &SymbolInfo, query_info: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(info),
            OutputFormat::Human => self.symbol_info_human(info, query_info),
        }
    }

    fn symbol_info_human(&self, info: &SymbolInfo, query_info: &str) -> String {
        let mut output = String::new();

        let headline = match (&info.name, &info.kind) {
            (Some(name), Some(kind)) => format!("{kind} {name}"),
            (Some(name), None) => name.clone(),
            _ => query_info.to_string(),
        };
        let _ = writeln!(output, "{}", self.paint_bold(&headline));

        if let Some(module) = &info.module {
            let _ = writeln!(output, "  in {module}");
        }
        if let Some(signature) = &info.signature {
            let _ = writeln!(output, "\n  {signature}");
        }
        if let Some(definition) = &info.definition {
            let _ = writeln!(output, "\n  defined at {}", self.location_line(definition));
            if let Some(snippet) = &definition.snippet {
                for line in snippet.lines() {
                    let _ = writeln!(output, "  | {line}");
                }
            }
        }
        if let Some(docs) = &info.documentation {
            output.push('\n');
            for line in docs.lines() {
                let _ = writeln!(output, "  {line}");
            }
        }

        if output.trim().is_empty() {
            return format!("No information found for: {query_info}\n");
        }
        output
    }

    pub fn format_search_results(&self, results: &[SymbolSearchResult], query: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(results),
            OutputFormat::Human => {
                if results.is_empty() {
                    return format!("No symbols found for: '{query}'\n");
                }
                let mut output =
                    format!("Found {} symbol(s) for: '{query}'\n\n", results.len());
                for (i, result) in results.iter().enumerate() {
                    let kind = result.kind.as_deref().unwrap_or("symbol");
                    let _ = writeln!(
                        output,
                        "{}. {} {}",
                        i + 1,
                        kind,
                        self.paint_bold(&result.name)
                    );
                    if let Some(module) = &result.module {
                        let _ = writeln!(output, "   in {module}");
                    }
                    if let Some(definition) = &result.definition {
                        let _ = writeln!(output, "   {}", self.location_line(definition));
                    }
                    if let Some(signature) = &result.signature {
                        let _ = writeln!(output, "   {signature}");
                    }
                    output.push('\n');
                }
                output
            }
        }
    }

    pub fn format_status(&self, status: &DaemonStatus) -> String {
        match self.format {
            OutputFormat::Json => to_json(status),
            OutputFormat::Human => {
                let mut output = String::new();
                let _ = writeln!(output, "{}", self.paint_bold("daemon: running"));
                let _ = writeln!(output, "  socket:       {}", status.socket_path);
                let _ = writeln!(output, "  log:          {}", status.log_path);
                let _ = writeln!(output, "  idle timeout: {}s", status.idle_timeout_secs);
                if status.sessions.is_empty() {
                    let _ = writeln!(output, "  sessions:     none");
                } else {
                    let _ = writeln!(output, "  sessions:");
                    for session in &status.sessions {
                        let _ = writeln!(
                            output,
                            "    {} ({}) last used {}",
                            session.workspace_root_path,
                            session.kind.as_str(),
                            session.last_used
                        );
                    }
                }
                output
            }
        }
    }

    fn location_line(&self, definition: &DefinitionLocation) -> String {
        format!(
            "{}:{}:{}",
            self.uri_to_path(&definition.uri),
            definition.start_line,
            definition.start_character
        )
    }

    fn uri_to_path(&self, uri: &str) -> String {
        let Some(abs_path) = uri.strip_prefix("file://") else {
            return uri.to_string();
        };
        match Path::new(abs_path).strip_prefix(&self.cwd) {
            Ok(rel) => rel.display().to_string(),
            Err(_) => abs_path.to_string(),
        }
    }

    fn paint_bold(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(format: OutputFormat) -> OutputFormatter {
        OutputFormatter { format, color: false, cwd: PathBuf::from("/repo") }
    }

    fn sample_info() -> SymbolInfo {
        SymbolInfo {
            name: Some("greet".into()),
            kind: Some("function".into()),
            module: None,
            definition: Some(DefinitionLocation {
                uri: "file:///repo/Sources/App.swift".into(),
                start_line: 12,
                start_character: 6,
                end_line: 12,
                end_character: 11,
                snippet: Some("func greet(name: String) -> String {".into()),
            }),
            signature: Some("func greet(name: String) -> String".into()),
            documentation: Some("Greets someone by name.".into()),
        }
    }

    #[test]
    fn test_human_symbol_info_shows_relative_location() {
        let output = plain(OutputFormat::Human).format_symbol_info(&sample_info(), "greet");
        assert!(output.contains("function greet"));
        assert!(output.contains("Sources/App.swift:12:6"));
        assert!(!output.contains("/repo/Sources"), "path should be relative to cwd");
        assert!(output.contains("| func greet"));
        assert!(output.contains("Greets someone by name."));
    }

    #[test]
    fn test_json_output_is_parseable() {
        let output = plain(OutputFormat::Json).format_symbol_info(&sample_info(), "greet");
        let value: serde_json::Value = serde_json::from_str(&output).expect("valid json");
        assert_eq!(value["name"], "greet");
        assert_eq!(value["definition"]["startLine"], 12);
    }

    #[test]
    fn test_search_results_numbered() {
        let results = vec![
            SymbolSearchResult {
                name: "AppDelegate".into(),
                kind: Some("class".into()),
                module: Some("App".into()),
                definition: None,
                signature: None,
                documentation: None,
            },
            SymbolSearchResult {
                name: "AppConfig".into(),
                kind: None,
                module: None,
                definition: None,
                signature: None,
                documentation: None,
            },
        ];
        let output = plain(OutputFormat::Human).format_search_results(&results, "App");
        assert!(output.contains("Found 2 symbol(s)"));
        assert!(output.contains("1. class AppDelegate"));
        assert!(output.contains("2. symbol AppConfig"));
    }

    #[test]
    fn test_status_without_sessions() {
        let status = DaemonStatus {
            socket_path: "/tmp/skf/daemon.sock".into(),
            idle_timeout_secs: 300,
            log_path: "/tmp/skf/daemon.log".into(),
            sessions: vec![],
        };
        let output = plain(OutputFormat::Human).format_status(&status);
        assert!(output.contains("daemon: running"));
        assert!(output.contains("sessions:     none"));
    }
}
