//! Narration sinks for a validation run.
//!
//! The sequencer never prints. It tells a [`Reporter`] what happened and the
//! reporter decides where that goes.

use std::io::Write;

use crate::mcp_client::types::{JsonRpcRequest, RpcResponse, ServerInfo, ToolDescriptor};

use super::types::{ValidationOutcome, ValidationReport};

/// Receives progress events from the sequencer. Every method defaults to a
/// no-op.
pub trait Reporter {
    fn launching(&mut self, _command: &[String]) {}
    fn request(&mut self, _request: &JsonRpcRequest) {}
    fn response(&mut self, _method: &str, _response: &RpcResponse) {}
    fn server_info(&mut self, _info: &ServerInfo) {}
    fn tools(&mut self, _tools: &[ToolDescriptor]) {}
    fn step(&mut self, _outcome: &ValidationOutcome) {}
    fn finished(&mut self, _report: &ValidationReport) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}

// ─── ConsoleReporter ─────────────────────────────────────────────────────────

/// Human-readable trace written to any `Write` sink (stdout in the CLI).
pub struct ConsoleReporter<W: Write> {
    out: W,
    /// Print the raw request/response trace as well as step results.
    verbose: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn launching(&mut self, command: &[String]) {
        let _ = writeln!(self.out, "{}", "=".repeat(60));
        let _ = writeln!(self.out, "Testing MCP server: {}", command.join(" "));
        let _ = writeln!(self.out, "{}", "=".repeat(60));
    }

    fn request(&mut self, request: &JsonRpcRequest) {
        let _ = writeln!(self.out, "\nTesting {}...", request.method);
        if self.verbose {
            if let Ok(json) = serde_json::to_string(request) {
                let _ = writeln!(self.out, "  -> {json}");
            }
        }
    }

    fn response(&mut self, _method: &str, response: &RpcResponse) {
        if !self.verbose {
            return;
        }
        let line = match response {
            RpcResponse::Success { result, .. } => format!("result {result}"),
            RpcResponse::Failure { error, .. } => {
                format!("error [{}] {}", error.code, error.message)
            }
            RpcResponse::Malformed { raw, .. } => format!("unparseable: {raw}"),
        };
        let _ = writeln!(self.out, "  <- {line}");
    }

    fn server_info(&mut self, info: &ServerInfo) {
        let _ = writeln!(self.out, "  Server: {} v{}", info.name, info.version);
    }

    fn tools(&mut self, tools: &[ToolDescriptor]) {
        let _ = writeln!(self.out, "  Found {} tools:", tools.len());
        for tool in tools {
            let description = tool.description.as_deref().unwrap_or("No description");
            let _ = writeln!(self.out, "   - {}: {}", tool.name, description);
        }
    }

    fn step(&mut self, outcome: &ValidationOutcome) {
        let _ = writeln!(
            self.out,
            "[{}] {} ({}ms): {}",
            outcome.status.label(),
            outcome.step,
            outcome.duration_ms,
            outcome.detail
        );
    }

    fn finished(&mut self, report: &ValidationReport) {
        let verdict = if report.passed { "passed" } else { "failed" };
        let _ = writeln!(self.out, "\nMCP server validation {verdict}");
        let _ = self.out.flush();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::types::{StepStatus, STEP_CALL_TOOL, STEP_INITIALIZE};

    fn render(verbose: bool, f: impl FnOnce(&mut ConsoleReporter<Vec<u8>>)) -> String {
        let mut reporter = ConsoleReporter::new(Vec::new(), verbose);
        f(&mut reporter);
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_tools_listing_uses_placeholder_description() {
        let out = render(false, |r| {
            r.tools(&[
                ToolDescriptor {
                    name: "build".into(),
                    description: Some("Run a build".into()),
                },
                ToolDescriptor {
                    name: "clean".into(),
                    description: None,
                },
            ])
        });
        assert!(out.contains("Found 2 tools"));
        assert!(out.contains("- build: Run a build"));
        assert!(out.contains("- clean: No description"));
    }

    #[test]
    fn test_step_line() {
        let out = render(false, |r| {
            r.step(&ValidationOutcome::new(STEP_CALL_TOOL, StepStatus::Skipped, "not advertised", 0))
        });
        assert_eq!(out, "[SKIP] tools/call (0ms): not advertised\n");
    }

    #[test]
    fn test_trace_only_when_verbose() {
        let request = JsonRpcRequest::new(1, STEP_INITIALIZE, None);
        let quiet = render(false, |r| r.request(&request));
        let loud = render(true, |r| r.request(&request));
        assert!(!quiet.contains("->"));
        assert!(loud.contains(r#"-> {"jsonrpc":"2.0","id":1,"method":"initialize"}"#));
    }

    #[test]
    fn test_failure_response_rendering() {
        let response = RpcResponse::decode(r#"{"id":1,"error":{"code":-1,"message":"bad"}}"#);
        let out = render(true, |r| r.response(STEP_INITIALIZE, &response));
        assert!(out.contains("<- error [-1] bad"));
    }
}
