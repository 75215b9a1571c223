//! Server process lifecycle management.
//!
//! Spawns the server under test as a child process with piped stdio, keeps
//! its stderr drained, and guarantees the child is gone when the run ends.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::StdioTransport;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default time a server gets to exit after its stdin is closed.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How much trailing stderr output is kept for diagnostics.
const STDERR_TAIL_LIMIT: usize = 2000;

/// How long to wait for the stderr drain to finish after the child exits.
const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(500);

// ─── ManagedServer ───────────────────────────────────────────────────────────

/// A running server process with its transport.
pub struct ManagedServer {
    /// Display form of the command line, used in logs and errors.
    pub name: String,
    process: Child,
    pub transport: StdioTransport,
    stderr_task: Option<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<String>>,
}

impl ManagedServer {
    /// Last lines the server wrote to stderr.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.clone())
            .unwrap_or_default()
    }

    /// Terminate the server and reap it.
    ///
    /// Closes stdin first and waits up to `timeout` for a clean exit, then
    /// force-kills. A process that has already exited is not an error.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), McpError> {
        if let Ok(Some(status)) = self.process.try_wait() {
            tracing::debug!(server = %self.name, %status, "server already exited");
            self.transport.close_writer().await;
            self.join_stderr().await;
            return Ok(());
        }

        self.transport.close_writer().await;

        match tokio::time::timeout(timeout, self.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(server = %self.name, %status, "server exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.name, error = %e, "wait failed, killing server");
                self.force_kill().await?;
            }
            Err(_) => {
                tracing::warn!(
                    server = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "server ignored end of input, killing"
                );
                self.force_kill().await?;
            }
        }

        self.join_stderr().await;
        Ok(())
    }

    async fn force_kill(&mut self) -> Result<(), McpError> {
        match self.process.kill().await {
            Ok(()) => Ok(()),
            // Raced with a natural exit.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(McpError::Transport {
                server: self.name.clone(),
                reason: format!("failed to kill server: {e}"),
            }),
        }
    }

    async fn join_stderr(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            if tokio::time::timeout(STDERR_DRAIN_GRACE, task).await.is_err() {
                tracing::debug!(server = %self.name, "stderr still open after exit");
            }
        }
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn the server process described by `command_line`.
///
/// The first element is the executable, the rest are its arguments. The
/// child is killed if the returned handle is dropped without `shutdown`.
pub fn spawn_server(command_line: &[String]) -> Result<ManagedServer, McpError> {
    let name = command_line.join(" ");
    let (program, args) = command_line.split_first().ok_or_else(|| McpError::LaunchFailed {
        command: name.clone(),
        reason: "empty command line".into(),
    })?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| McpError::LaunchFailed {
            command: name.clone(),
            reason: format!("{e}"),
        })?;

    let stdin = child.stdin.take().ok_or(McpError::LaunchFailed {
        command: name.clone(),
        reason: "failed to capture stdin".into(),
    })?;

    let stdout = child.stdout.take().ok_or(McpError::LaunchFailed {
        command: name.clone(),
        reason: "failed to capture stdout".into(),
    })?;

    let stderr_tail = Arc::new(Mutex::new(String::new()));
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(drain_stderr(name.clone(), stderr, stderr_tail.clone())));

    tracing::info!(server = %name, pid = ?child.id(), "server process started");

    Ok(ManagedServer {
        transport: StdioTransport::new(&name, stdin, stdout),
        name,
        process: child,
        stderr_task,
        stderr_tail,
    })
}

/// Keep reading stderr so the child never blocks on a full pipe.
async fn drain_stderr(server: String, stderr: ChildStderr, tail: Arc<Mutex<String>>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(server = %server, line = %line, "server stderr");
                if let Ok(mut buf) = tail.lock() {
                    push_bounded(&mut buf, &line, STDERR_TAIL_LIMIT);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "stopped reading server stderr");
                break;
            }
        }
    }
}

/// Append a line, dropping the oldest bytes beyond `limit`.
fn push_bounded(buf: &mut String, line: &str, limit: usize) {
    buf.push_str(line);
    buf.push('\n');
    if buf.len() > limit {
        let mut cut = buf.len() - limit;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

// ─── ProcessSupervisor ───────────────────────────────────────────────────────

/// Owns at most one server process for the duration of a run.
pub struct ProcessSupervisor {
    server: Option<ManagedServer>,
    shutdown_timeout: Duration,
    /// stderr captured from the last stopped server.
    last_stderr: String,
}

impl ProcessSupervisor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            server: None,
            shutdown_timeout,
            last_stderr: String::new(),
        }
    }

    /// Launch the server. Fails if one is already running.
    pub fn start(&mut self, command_line: &[String]) -> Result<(), McpError> {
        if let Some(running) = &self.server {
            return Err(McpError::LaunchFailed {
                command: command_line.join(" "),
                reason: format!("server '{}' is already running", running.name),
            });
        }
        self.server = Some(spawn_server(command_line)?);
        Ok(())
    }

    /// Transport to the running server, if any.
    pub fn transport(&self) -> Option<&StdioTransport> {
        self.server.as_ref().map(|s| &s.transport)
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Stop the server. Safe to call any number of times, including when
    /// `start` never succeeded.
    pub async fn stop(&mut self) -> Result<(), McpError> {
        let Some(mut server) = self.server.take() else {
            return Ok(());
        };
        let result = server.shutdown(self.shutdown_timeout).await;
        self.last_stderr = server.stderr_tail();
        result
    }

    /// stderr of the running server, or of the last one stopped.
    pub fn stderr_tail(&self) -> String {
        match &self.server {
            Some(server) => server.stderr_tail(),
            None => self.last_stderr.clone(),
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_push_bounded_keeps_tail() {
        let mut buf = String::new();
        push_bounded(&mut buf, "aaaa", 8);
        push_bounded(&mut buf, "bbbb", 8);
        assert_eq!(buf, "aa\nbbbb\n");
        assert!(buf.len() <= 8);
    }

    #[test]
    fn test_push_bounded_respects_char_boundaries() {
        let mut buf = String::new();
        push_bounded(&mut buf, "ééééé", 5);
        assert!(buf.len() <= 5);
        assert!(buf.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_empty_command_line() {
        let mut supervisor = ProcessSupervisor::default();
        let err = supervisor.start(&[]).unwrap_err();
        assert!(matches!(err, McpError::LaunchFailed { .. }));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let mut supervisor = ProcessSupervisor::default();
        let err = supervisor
            .start(&["/nonexistent/mcp-server-binary".to_string()])
            .unwrap_err();
        assert!(matches!(err, McpError::LaunchFailed { .. }));
        assert!(supervisor.transport().is_none());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut supervisor = ProcessSupervisor::default();
        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_twice_is_safe() {
        let mut supervisor = ProcessSupervisor::default();
        supervisor.start(&sh("cat")).unwrap();
        assert!(supervisor.is_running());

        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_after_child_exited() {
        let mut supervisor = ProcessSupervisor::default();
        supervisor.start(&sh("exit 3")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        supervisor.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_twice_rejected() {
        let mut supervisor = ProcessSupervisor::default();
        supervisor.start(&sh("cat")).unwrap();
        let err = supervisor.start(&sh("cat")).unwrap_err();
        assert!(matches!(err, McpError::LaunchFailed { .. }));
        supervisor.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stuck_server_is_killed() {
        let mut supervisor = ProcessSupervisor::new(Duration::from_millis(200));
        supervisor.start(&sh("exec sleep 30")).unwrap();

        let started = Instant::now();
        supervisor.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_captured() {
        let mut supervisor = ProcessSupervisor::default();
        supervisor.start(&sh("echo 'booting up' >&2; cat")).unwrap();
        supervisor.stop().await.unwrap();
        assert!(supervisor.stderr_tail().contains("booting up"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transport_round_trip_through_child() {
        let mut supervisor = ProcessSupervisor::default();
        supervisor.start(&sh("cat")).unwrap();

        let transport = supervisor.transport().unwrap();
        transport.write_line(r#"{"ping":true}"#).await.unwrap();
        assert_eq!(transport.read_line().await.unwrap(), r#"{"ping":true}"#);

        supervisor.stop().await.unwrap();
    }
}
