//! Daemon subsystem: persistent sourcekit-lsp sessions behind a Unix
//! socket, so repeated CLI invocations skip the index warm-up cost.

pub mod client;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::DaemonClient;
pub use server::DaemonServer;
