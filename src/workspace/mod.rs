pub mod detection;

pub use detection::{resolve, WorkspaceKey, WorkspaceKind};
