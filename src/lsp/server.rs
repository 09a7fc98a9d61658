use anyhow::Result;
use std::process::Stdio;
use tokio::io::BufReader;
use tokio::process::{Child, Command};

use crate::utils::error::SkFindError;

/// Describes how to invoke `sourcekit-lsp`: directly or through the
/// toolchain shim.
enum LspCommand {
    Direct,
    Xcrun,
}

impl LspCommand {
    fn build(&self) -> Command {
        match self {
            Self::Direct => Command::new("sourcekit-lsp"),
            Self::Xcrun => {
                let mut cmd = Command::new("xcrun");
                cmd.arg("sourcekit-lsp");
                cmd
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Direct => "sourcekit-lsp",
            Self::Xcrun => "xcrun sourcekit-lsp",
        }
    }
}

/// Handle to one spawned sourcekit-lsp child process.
pub struct SourceKitLspServer {
    process: Child,
}

impl SourceKitLspServer {
    /// Try to find a working `sourcekit-lsp` invocation. Checks PATH first,
    /// then falls back to `xcrun sourcekit-lsp` (macOS toolchains ship it
    /// behind the shim).
    async fn resolve_lsp_command() -> Result<LspCommand, SkFindError> {
        if let Ok(output) = Command::new("sourcekit-lsp").arg("--help").output().await {
            if output.status.success() {
                tracing::debug!("Found sourcekit-lsp on PATH");
                return Ok(LspCommand::Direct);
            }
        }

        tracing::debug!("sourcekit-lsp not found on PATH, trying xcrun...");

        let xcrun_output = Command::new("xcrun")
            .arg("sourcekit-lsp")
            .arg("--help")
            .output()
            .await
            .map_err(|e| SkFindError::LspLaunchFailed {
                message: format!(
                    "Neither 'sourcekit-lsp' nor 'xcrun' found on PATH. \
                     Install a Swift toolchain from swift.org. ({e})"
                ),
            })?;

        if xcrun_output.status.success() {
            tracing::debug!("Found sourcekit-lsp via xcrun");
            return Ok(LspCommand::Xcrun);
        }

        let stderr = String::from_utf8_lossy(&xcrun_output.stderr);
        Err(SkFindError::LspLaunchFailed {
            message: format!(
                "sourcekit-lsp is not available. Tried 'sourcekit-lsp' and \
                 'xcrun sourcekit-lsp' but neither worked. stderr: {}",
                stderr.trim()
            ),
        })
    }

    pub async fn start(workspace_root: &str) -> Result<Self, SkFindError> {
        let lsp_cmd = Self::resolve_lsp_command().await?;

        tracing::debug!(
            "Starting sourcekit-lsp via '{}' in workspace: {workspace_root}",
            lsp_cmd.label(),
        );

        let process = lsp_cmd
            .build()
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SkFindError::LspLaunchFailed {
                message: format!(
                    "Failed to spawn '{}' in workspace '{workspace_root}': {e}",
                    lsp_cmd.label(),
                ),
            })?;

        tracing::debug!("sourcekit-lsp process started (pid: {:?})", process.id());

        Ok(Self { process })
    }

    pub fn take_stdin(&mut self) -> tokio::process::ChildStdin {
        self.process.stdin.take().expect("sourcekit-lsp stdin not available (already taken)")
    }

    pub fn take_stdout(&mut self) -> BufReader<tokio::process::ChildStdout> {
        BufReader::new(
            self.process.stdout.take().expect("sourcekit-lsp stdout not available (already taken)"),
        )
    }
}

#[cfg(test)]
impl SourceKitLspServer {
    /// Wrap an arbitrary child process so client-level behavior can be
    /// tested without a real sourcekit-lsp install.
    pub(crate) fn wrapping(process: Child) -> Self {
        Self { process }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.process.id()
    }
}

impl Drop for SourceKitLspServer {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}
