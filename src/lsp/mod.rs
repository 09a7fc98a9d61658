//! sourcekit-lsp integration: process management, stdio JSON-RPC client,
//! protocol shapes, and the per-workspace session wrapper.

pub mod client;
pub mod protocol;
pub mod server;
pub mod session;
