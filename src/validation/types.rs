//! Step outcomes and the run report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mcp_client::types::{ServerInfo, ToolDescriptor};

// ─── Step Names ──────────────────────────────────────────────────────────────

pub const STEP_LAUNCH: &str = "launch";
pub const STEP_INITIALIZE: &str = "initialize";
pub const STEP_LIST_TOOLS: &str = "tools/list";
pub const STEP_CALL_TOOL: &str = "tools/call";

/// Steps whose success decides the verdict.
pub const MANDATORY_STEPS: [&str; 3] = [STEP_LAUNCH, STEP_INITIALIZE, STEP_LIST_TOOLS];

// ─── Sequencer State ─────────────────────────────────────────────────────────

/// Where a run is in the fixed validation script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    NotStarted,
    Launched,
    Initialized,
    ToolsListed,
    ToolInvoked,
    Skipped,
    Done,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not attempted because its precondition did not hold. Not a failure.
    Skipped,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Passed => "PASS",
            StepStatus::Failed => "FAIL",
            StepStatus::Skipped => "SKIP",
        }
    }
}

/// Result of one step of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub step: String,
    pub status: StepStatus,
    pub mandatory: bool,
    pub detail: String,
    pub duration_ms: u64,
}

impl ValidationOutcome {
    pub fn new(step: &str, status: StepStatus, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step: step.to_string(),
            status,
            mandatory: MANDATORY_STEPS.contains(&step),
            detail: detail.into(),
            duration_ms,
        }
    }

    /// `true` unless the step failed.
    pub fn passed(&self) -> bool {
        self.status != StepStatus::Failed
    }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Everything a run produced, in step order.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub command: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ValidationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    pub tools: Vec<ToolDescriptor>,
    /// Furthest state reached before `Done`.
    pub reached: SequencerState,
    pub passed: bool,
}

impl ValidationReport {
    pub fn new(command: &[String]) -> Self {
        Self {
            command: command.to_vec(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            server_info: None,
            tools: Vec::new(),
            reached: SequencerState::NotStarted,
            passed: false,
        }
    }

    pub fn record(&mut self, outcome: ValidationOutcome) {
        self.outcomes.push(outcome);
    }

    /// Outcome of the named step, if it ran.
    pub fn outcome(&self, step: &str) -> Option<&ValidationOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }

    /// Compute the verdict: every mandatory step ran and passed.
    pub fn finish(&mut self) {
        self.passed = MANDATORY_STEPS.iter().all(|step| {
            self.outcome(step)
                .is_some_and(|o| o.status == StepStatus::Passed)
        });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
