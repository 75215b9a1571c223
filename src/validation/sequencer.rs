//! Validation sequencer — the fixed conformance script.
//!
//! ```text
//! NotStarted → Launched → Initialized → ToolsListed → ToolInvoked | Skipped → Done
//! ```
//!
//! Launch, `initialize` and `tools/list` are mandatory: the first failure
//! ends the run with a failing verdict. The `tools/call` smoke check runs only
//! when the target tool is advertised, and its result is reported without
//! touching the verdict. The server process is stopped exactly once on every
//! path.

use std::time::Instant;

use serde::Serialize;

use crate::config::ProbeConfig;
use crate::mcp_client::types::{
    first_text_content, parse_tool_catalog, ServerInfo, ToolCallParams, ToolDescriptor,
};
use crate::mcp_client::{McpError, ProcessSupervisor, RpcClient, RpcResponse};

use super::reporter::Reporter;
use super::types::{
    SequencerState, StepStatus, ValidationOutcome, ValidationReport, STEP_CALL_TOOL,
    STEP_INITIALIZE, STEP_LAUNCH, STEP_LIST_TOOLS,
};

/// Longest tool output echoed into the step detail.
const TOOL_PREVIEW_CHARS: usize = 100;

/// Run the full validation script described by `config`.
pub async fn run_validation(config: &ProbeConfig, reporter: &mut dyn Reporter) -> ValidationReport {
    Sequencer::new(config, reporter).run().await
}

// ─── Sequencer ───────────────────────────────────────────────────────────────

pub struct Sequencer<'a> {
    config: &'a ProbeConfig,
    reporter: &'a mut dyn Reporter,
    state: SequencerState,
    report: ValidationReport,
}

impl<'a> Sequencer<'a> {
    pub fn new(config: &'a ProbeConfig, reporter: &'a mut dyn Reporter) -> Self {
        Self {
            config,
            reporter,
            state: SequencerState::NotStarted,
            report: ValidationReport::new(&config.command),
        }
    }

    /// Execute every step and return the report.
    pub async fn run(mut self) -> ValidationReport {
        let mut supervisor = ProcessSupervisor::new(self.config.shutdown_timeout());

        self.launch(&mut supervisor);

        if let Some(transport) = supervisor.transport() {
            let client = RpcClient::new(transport)
                .with_response_timeout(Some(self.config.response_timeout()));
            self.probe(&client).await;
        }

        if let Err(e) = supervisor.stop().await {
            tracing::warn!(error = %e, "server did not stop cleanly");
        }

        let stderr = supervisor.stderr_tail();
        self.report.reached = self.state;
        self.transition(SequencerState::Done);
        self.report.finish();

        if !self.report.passed && !stderr.is_empty() {
            tracing::info!(stderr = %stderr.trim_end(), "server stderr");
        }
        tracing::info!(
            passed = self.report.passed,
            reached = ?self.report.reached,
            steps = self.report.outcomes.len(),
            "validation finished"
        );

        self.reporter.finished(&self.report);
        self.report
    }

    // ─── Steps ───────────────────────────────────────────────────────────

    fn launch(&mut self, supervisor: &mut ProcessSupervisor) {
        let started = Instant::now();
        self.reporter.launching(&self.config.command);

        match supervisor.start(&self.config.command) {
            Ok(()) => {
                self.record(STEP_LAUNCH, StepStatus::Passed, "server process started", started);
                self.transition(SequencerState::Launched);
            }
            Err(e) => {
                self.record(STEP_LAUNCH, StepStatus::Failed, e.to_string(), started);
            }
        }
    }

    async fn probe(&mut self, client: &RpcClient<'_>) {
        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let Some(info) = self.initialize(client).await else {
            return;
        };
        self.reporter.server_info(&info);
        self.report.server_info = Some(info);
        self.transition(SequencerState::Initialized);

        let Some(tools) = self.list_tools(client).await else {
            return;
        };
        self.reporter.tools(&tools);
        self.report.tools = tools;
        self.transition(SequencerState::ToolsListed);

        self.call_target_tool(client).await;
    }

    async fn initialize(&mut self, client: &RpcClient<'_>) -> Option<ServerInfo> {
        let started = Instant::now();
        let outcome = match encode(&self.config.initialize_params()) {
            Ok(params) => self.exchange(client, STEP_INITIALIZE, Some(params)).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(RpcResponse::Success { result, .. }) => match ServerInfo::from_initialize_result(&result) {
                Ok(info) => {
                    let detail = format!("server {} v{}", info.name, info.version);
                    self.record(STEP_INITIALIZE, StepStatus::Passed, detail, started);
                    Some(info)
                }
                Err(e) => {
                    self.record(STEP_INITIALIZE, StepStatus::Failed, e.to_string(), started);
                    None
                }
            },
            other => {
                self.record_failure(STEP_INITIALIZE, other, started);
                None
            }
        }
    }

    async fn list_tools(&mut self, client: &RpcClient<'_>) -> Option<Vec<ToolDescriptor>> {
        let started = Instant::now();

        match self.exchange(client, STEP_LIST_TOOLS, None).await {
            Ok(RpcResponse::Success { result, .. }) => match parse_tool_catalog(&result) {
                Ok(tools) => {
                    let detail = format!("found {} tools", tools.len());
                    self.record(STEP_LIST_TOOLS, StepStatus::Passed, detail, started);
                    Some(tools)
                }
                Err(e) => {
                    self.record(STEP_LIST_TOOLS, StepStatus::Failed, e.to_string(), started);
                    None
                }
            },
            other => {
                self.record_failure(STEP_LIST_TOOLS, other, started);
                None
            }
        }
    }

    async fn call_target_tool(&mut self, client: &RpcClient<'_>) {
        let started = Instant::now();
        let config = self.config;
        let target = config.target_tool.as_str();

        if !self.report.tools.iter().any(|t| t.name == target) {
            let detail = format!("tool '{target}' not advertised by server");
            self.record(STEP_CALL_TOOL, StepStatus::Skipped, detail, started);
            self.transition(SequencerState::Skipped);
            return;
        }

        let params = ToolCallParams {
            name: target.to_string(),
            arguments: config.tool_arguments.clone(),
        };
        let outcome = match encode(&params) {
            Ok(params) => self.exchange(client, STEP_CALL_TOOL, Some(params)).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(RpcResponse::Success { result, .. }) => {
                let detail = match first_text_content(&result) {
                    Some(text) => {
                        let preview: String = text.chars().take(TOOL_PREVIEW_CHARS).collect();
                        format!("'{target}' responded: {preview}")
                    }
                    None => format!("'{target}' responded"),
                };
                self.record(STEP_CALL_TOOL, StepStatus::Passed, detail, started);
            }
            other => self.record_failure(STEP_CALL_TOOL, other, started),
        }
        self.transition(SequencerState::ToolInvoked);
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    /// Send one request, narrating both directions.
    async fn exchange(
        &mut self,
        client: &RpcClient<'_>,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<RpcResponse, McpError> {
        let request = client.build_request(method, params);
        self.reporter.request(&request);

        let response = client.send(&request).await?;
        self.reporter.response(method, &response);
        Ok(response)
    }

    /// Record a step that did not get a `Success` back.
    fn record_failure(
        &mut self,
        step: &str,
        outcome: Result<RpcResponse, McpError>,
        started: Instant,
    ) {
        let detail = match outcome {
            Ok(response) => McpError::from_response(&response)
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unexpected success".to_string()),
            Err(e) => {
                if e.is_fatal() {
                    tracing::warn!(step, error = %e, "channel to server lost");
                }
                e.to_string()
            }
        };
        self.record(step, StepStatus::Failed, detail, started);
    }

    fn record(&mut self, step: &str, status: StepStatus, detail: impl Into<String>, started: Instant) {
        let outcome = ValidationOutcome::new(
            step,
            status,
            detail,
            started.elapsed().as_millis() as u64,
        );
        tracing::info!(step, status = outcome.status.label(), detail = %outcome.detail, "step finished");
        self.reporter.step(&outcome);
        self.report.record(outcome);
    }

    fn transition(&mut self, next: SequencerState) {
        tracing::debug!(from = ?self.state, to = ?next, "sequencer transition");
        self.state = next;
    }
}

fn encode<T: Serialize>(params: &T) -> Result<serde_json::Value, McpError> {
    serde_json::to_value(params).map_err(|e| McpError::Protocol {
        code: None,
        reason: format!("failed to encode request params: {e}"),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
