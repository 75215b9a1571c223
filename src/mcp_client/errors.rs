//! MCP Client error types.

use thiserror::Error;

use super::types::RpcResponse;

/// Errors that can occur while talking to a server under test.
///
/// `LaunchFailed`, `Transport` and `Timeout` mean the channel to the child is
/// gone and nothing further can be validated. `Protocol` and
/// `MalformedResponse` describe a bad answer on a live channel and are
/// reported as failed steps.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be started.
    #[error("failed to launch '{command}': {reason}")]
    LaunchFailed {
        command: String,
        reason: String,
    },

    /// The stdio stream to the server closed or broke mid-exchange.
    #[error("transport error for server '{server}': {reason}")]
    Transport {
        server: String,
        reason: String,
    },

    /// No complete response line arrived within the configured timeout.
    #[error("server '{server}' did not answer '{method}' within {timeout_ms}ms")]
    Timeout {
        server: String,
        method: String,
        timeout_ms: u64,
    },

    /// Well-formed JSON with the wrong shape, or a JSON-RPC error where a
    /// result was expected.
    #[error("protocol error: {reason}")]
    Protocol {
        code: Option<i64>,
        reason: String,
    },

    /// The response line was not a JSON-RPC response at all.
    #[error("malformed response: {reason} (raw: {raw})")]
    MalformedResponse {
        raw: String,
        reason: String,
    },

    /// Configuration error (missing command, bad config file).
    #[error("config error: {reason}")]
    Config {
        reason: String,
    },
}

impl McpError {
    /// Whether the error leaves the channel to the server unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            McpError::LaunchFailed { .. } | McpError::Transport { .. } | McpError::Timeout { .. }
        )
    }

    /// Describe a non-success response as a step-level error.
    ///
    /// Returns `None` for `Success`; callers decide what a success means.
    pub fn from_response(response: &RpcResponse) -> Option<Self> {
        match response {
            RpcResponse::Success { .. } => None,
            RpcResponse::Failure { error, .. } => Some(McpError::Protocol {
                code: Some(error.code),
                reason: format!("server returned error [{}]: {}", error.code, error.message),
            }),
            RpcResponse::Malformed { raw, reason } => Some(McpError::MalformedResponse {
                raw: raw.clone(),
                reason: reason.clone(),
            }),
        }
    }
}
