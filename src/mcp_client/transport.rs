//! Newline-delimited framing over a child process's stdio.
//!
//! One JSON text per line in both directions. There is no length limit and
//! no read timeout at this layer; a server that never finishes a line blocks
//! `read_line` until the caller's timeout (see `client`) gives up.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::errors::McpError;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Line-framed duplex stream to one server.
pub struct StdioTransport {
    server_name: String,
    /// `None` once the writer has been closed for shutdown.
    writer: Mutex<Option<BoxedWriter>>,
    reader: Mutex<BoxedReader>,
}

impl StdioTransport {
    /// Create a new transport from a child process's stdin/stdout.
    pub fn new(server_name: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self::from_streams(server_name, stdin, BufReader::new(stdout))
    }

    /// Create a transport over arbitrary async streams.
    pub fn from_streams<W, R>(server_name: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(Some(Box::new(writer))),
            reader: Mutex::new(Box::new(reader)),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Write `payload` followed by a single `\n`, then flush.
    pub async fn write_line(&self, payload: &str) -> Result<(), McpError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| self.error("stdin already closed"))?;

        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(payload);
        line.push('\n');

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.error(format!("failed to flush stdin: {e}")))?;

        tracing::trace!(server = %self.server_name, bytes = line.len(), "line written");
        Ok(())
    }

    /// Read one line, without its terminator.
    ///
    /// End of stream before any byte is an error. Invalid UTF-8 is replaced
    /// rather than rejected so the caller can report it as a malformed
    /// response.
    pub async fn read_line(&self) -> Result<String, McpError> {
        let mut buf = Vec::new();
        let mut reader = self.reader.lock().await;

        let bytes_read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| self.error(format!("failed to read from stdout: {e}")))?;

        if bytes_read == 0 {
            return Err(self.error("server stdout closed (process may have exited)"));
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Drop the write half. For stdio servers this is end-of-input, the
    /// conventional request to exit. Idempotent.
    pub async fn close_writer(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    fn error(&self, reason: impl Into<String>) -> McpError {
        McpError::Transport {
            server: self.server_name.clone(),
            reason: reason.into(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
