//! JSON-RPC client over a line-framed transport.
//!
//! One request is in flight at a time: `call` writes a request line and the
//! next line read is its response. The response is classified into
//! [`RpcResponse`]; a JSON-RPC error from the server is a normal `Ok` value,
//! only a dead or silent channel is an `Err`.

use std::time::{Duration, Instant};

use super::errors::McpError;
use super::transport::StdioTransport;
use super::types::{JsonRpcRequest, RpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Request id used for every request; correlation is trivial when only one
/// request is ever outstanding.
pub const REQUEST_ID: u64 = 1;

/// Default time to wait for a response line.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// ─── RpcClient ───────────────────────────────────────────────────────────────

/// Sends requests over a borrowed transport and classifies the answers.
pub struct RpcClient<'a> {
    transport: &'a StdioTransport,
    /// `None` waits forever.
    response_timeout: Option<Duration>,
}

impl<'a> RpcClient<'a> {
    pub fn new(transport: &'a StdioTransport) -> Self {
        Self {
            transport,
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
        }
    }

    /// Set how long to wait for each response line.
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Build the envelope `call` would send.
    pub fn build_request(&self, method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(REQUEST_ID, method, params)
    }

    /// Send `method` and wait for its response.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<RpcResponse, McpError> {
        let request = self.build_request(method, params);
        self.send(&request).await
    }

    /// Send a prepared request and wait for its response.
    pub async fn send(&self, request: &JsonRpcRequest) -> Result<RpcResponse, McpError> {
        let start = Instant::now();

        let json = serde_json::to_string(request).map_err(|e| McpError::Transport {
            server: self.transport.server_name().to_string(),
            reason: format!("failed to serialize request: {e}"),
        })?;

        self.transport.write_line(&json).await?;
        tracing::debug!(method = %request.method, id = request.id, "request sent");

        let raw = match self.response_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.read_line())
                .await
                .map_err(|_| McpError::Timeout {
                    server: self.transport.server_name().to_string(),
                    method: request.method.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })??,
            None => self.transport.read_line().await?,
        };

        let response = RpcResponse::decode(&raw);

        if let Some(id) = response.id() {
            if id != request.id as i64 {
                tracing::warn!(
                    method = %request.method,
                    expected = request.id,
                    got = id,
                    "response id does not match request id"
                );
            }
        }

        tracing::debug!(
            method = %request.method,
            kind = response.kind(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "response received"
        );

        Ok(response)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
