//! Probe configuration loading and validation.
//!
//! A run is fully described by a [`ProbeConfig`]: which server to launch,
//! which handshake to send and which tool to invoke. Values come from an
//! optional YAML file (with `${VAR}` interpolation) and are then overridden
//! by command-line flags.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::mcp_client::types::InitializeParams;
use crate::mcp_client::McpError;

// ─── Defaults ────────────────────────────────────────────────────────────────

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const DEFAULT_CLIENT_NAME: &str = "test-client";
pub const DEFAULT_CLIENT_VERSION: &str = "1.0.0";
pub const DEFAULT_TARGET_TOOL: &str = "gradle_project_context";

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}
fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}
fn default_client_version() -> String {
    DEFAULT_CLIENT_VERSION.to_string()
}
fn default_target_tool() -> String {
    DEFAULT_TARGET_TOOL.to_string()
}
fn default_tool_arguments() -> serde_json::Value {
    serde_json::json!({"action": "get"})
}
fn default_response_timeout_secs() -> u64 {
    30
}
fn default_shutdown_timeout_secs() -> u64 {
    5
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Everything one conformance run needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeConfig {
    /// Server executable followed by its arguments.
    #[serde(default)]
    pub command: Vec<String>,
    /// Tool invoked by the optional smoke step.
    #[serde(default = "default_target_tool")]
    pub target_tool: String,
    /// `arguments` object sent with `tools/call`.
    #[serde(default = "default_tool_arguments")]
    pub tool_arguments: serde_json::Value,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Per-response wait, in seconds.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    /// Grace period between closing the server's stdin and killing it.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Pause between launch and the first request. Zero means the first
    /// request is the readiness probe.
    #[serde(default)]
    pub settle_delay_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            target_tool: default_target_tool(),
            tool_arguments: default_tool_arguments(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            response_timeout_secs: default_response_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            settle_delay_ms: 0,
        }
    }
}

impl ProbeConfig {
    /// Config for running `java -jar <jar>`.
    pub fn for_jar(jar_path: &str) -> Self {
        Self {
            command: vec!["java".to_string(), "-jar".to_string(), jar_path.to_string()],
            ..Self::default()
        }
    }

    /// Reject configs that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.command.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(McpError::Config {
                reason: "no server command given".into(),
            });
        }
        self.validate_settings()
    }

    /// Check everything but the command line, which may still come from
    /// flags.
    pub fn validate_settings(&self) -> Result<(), McpError> {
        if self.target_tool.trim().is_empty() {
            return Err(McpError::Config {
                reason: "target_tool must not be empty".into(),
            });
        }
        if !self.tool_arguments.is_object() {
            return Err(McpError::Config {
                reason: "tool_arguments must be a JSON object".into(),
            });
        }
        if self.response_timeout_secs == 0 || self.shutdown_timeout_secs == 0 {
            return Err(McpError::Config {
                reason: "timeouts must be at least one second".into(),
            });
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Parameters for the `initialize` handshake.
    pub fn initialize_params(&self) -> InitializeParams {
        InitializeParams::new(&self.protocol_version, &self.client_name, &self.client_version)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse a probe configuration file.
///
/// Performs environment-variable interpolation on the raw text for
/// `${VAR_NAME}` and `${VAR_NAME:-default}`, and expands a leading `~` in
/// the executable path.
pub fn load_probe_config(path: &Path) -> Result<ProbeConfig, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::Config {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let mut config: ProbeConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| McpError::Config {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

    if let Some(program) = config.command.first_mut() {
        *program = expand_tilde(program);
    }

    tracing::debug!(path = %path.display(), command = ?config.command, "probe config loaded");
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
