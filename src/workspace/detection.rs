//! Swift workspace root detection.
//!
//! Classifies a directory as a SwiftPM package root (`Package.swift`), an
//! Xcode project root (`*.xcodeproj`), or an Xcode workspace root
//! (`*.xcworkspace`), and resolves the `(rootPath, kind)` pair the session
//! pool uses as its cache key.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::error::{Result, SkFindError};

/// What kind of root anchors the workspace. Part of the pool key: the same
/// directory opened as a package and as an Xcode project gets two sessions,
/// because sourcekit-lsp builds its index differently for each.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum WorkspaceKind {
    ManifestPackage,
    IdeProject,
    IdeWorkspace,
}

impl WorkspaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestPackage => "manifestPackage",
            Self::IdeProject => "ideProject",
            Self::IdeWorkspace => "ideWorkspace",
        }
    }
}

/// Cache key for the session pool: absolute root path plus root kind.
/// Equality is structural; the pool never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceKey {
    pub root: PathBuf,
    pub kind: WorkspaceKind,
}

/// Resolve the workspace for a file or directory.
///
/// With an explicit root the directory itself must classify, otherwise the
/// search walks up from `file_or_dir` and the nearest classifiable ancestor
/// wins. Marker precedence inside one directory: `Package.swift`, then a
/// single `.xcworkspace` bundle, then a single `.xcodeproj` bundle.
/// More than one bundle of the winning flavor is ambiguous.
pub fn resolve(explicit: Option<&Path>, file_or_dir: &Path) -> Result<WorkspaceKey> {
    if let Some(root) = explicit {
        let kind = classify_dir(root)?.ok_or_else(|| SkFindError::UnsupportedWorkspace {
            path: root.display().to_string(),
        })?;
        return Ok(WorkspaceKey { root: root.to_path_buf(), kind });
    }

    let start = if file_or_dir.is_dir() {
        file_or_dir
    } else {
        file_or_dir.parent().unwrap_or(file_or_dir)
    };

    let mut current = start;
    loop {
        if let Some(kind) = classify_dir(current)? {
            return Ok(WorkspaceKey { root: current.to_path_buf(), kind });
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Err(SkFindError::WorkspaceNotFound { path: file_or_dir.display().to_string() })
}

/// Classify one directory, or `None` if it carries no Swift markers.
fn classify_dir(dir: &Path) -> Result<Option<WorkspaceKind>> {
    if dir.join("Package.swift").is_file() {
        return Ok(Some(WorkspaceKind::ManifestPackage));
    }

    let mut workspaces = 0usize;
    let mut projects = 0usize;
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        // Unreadable directory is "no markers here", not a hard failure.
        Err(_) => return Ok(None),
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".xcworkspace") {
            workspaces += 1;
        } else if name.ends_with(".xcodeproj") {
            projects += 1;
        }
    }

    match (workspaces, projects) {
        (1, _) => Ok(Some(WorkspaceKind::IdeWorkspace)),
        (0, 1) => Ok(Some(WorkspaceKind::IdeProject)),
        (0, 0) => Ok(None),
        _ => Err(SkFindError::WorkspaceAmbiguous { path: dir.display().to_string() }),
    }
}
