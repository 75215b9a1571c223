//! MCP Client — JSON-RPC over stdio to a single server under test.
//!
//! This module handles:
//! - Spawning the server child process and guaranteeing its termination
//! - Newline-delimited JSON framing over the child's stdin/stdout
//! - Building requests and classifying responses as success, failure or malformed

pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::RpcClient;
pub use errors::McpError;
pub use lifecycle::ProcessSupervisor;
pub use transport::StdioTransport;
pub use types::{JsonRpcRequest, RpcResponse, ServerInfo, ToolDescriptor};
