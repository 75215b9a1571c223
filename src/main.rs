//! `mcp-conformance` — check that an MCP server answers the basic protocol.
//!
//! Exit status: 0 when launch, `initialize` and `tools/list` all pass, 1 when
//! any of them fails or the run could not be set up, 2 on usage errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use mcp_conformance::config::{load_probe_config, ProbeConfig};
use mcp_conformance::validation::{run_validation, ConsoleReporter, NullReporter, Reporter};

#[derive(Debug, Parser)]
#[command(name = "mcp-conformance", version, about)]
struct Cli {
    /// YAML file with probe settings; flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Launch `java -jar <JAR>` as the server.
    #[arg(long, value_name = "JAR", conflicts_with = "command")]
    jar: Option<String>,

    /// Tool to invoke after listing.
    #[arg(long, value_name = "NAME")]
    tool: Option<String>,

    /// JSON object sent as the tool's `arguments`.
    #[arg(long, value_name = "JSON", value_parser = parse_json_object)]
    tool_args: Option<serde_json::Value>,

    /// Protocol version announced in `initialize`.
    #[arg(long, value_name = "VERSION")]
    protocol_version: Option<String>,

    /// Seconds to wait for each response.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Milliseconds to wait after launch before the first request.
    #[arg(long, value_name = "MS")]
    settle_ms: Option<u64>,

    /// Print the report as JSON instead of the console trace.
    #[arg(long)]
    json: bool,

    /// Show every request and response line.
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Server command line, e.g. `-- node dist/index.js`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    /// Merge the config file (if any) with flags.
    fn probe_config(&self) -> anyhow::Result<ProbeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let config = load_probe_config(path)
                    .with_context(|| format!("loading {}", path.display()))?;
                config
                    .validate_settings()
                    .with_context(|| format!("invalid config {}", path.display()))?;
                config
            }
            None => ProbeConfig::default(),
        };

        if let Some(jar) = &self.jar {
            config.command = ProbeConfig::for_jar(jar).command;
        }
        if !self.command.is_empty() {
            config.command = self.command.clone();
        }
        if let Some(tool) = &self.tool {
            config.target_tool = tool.clone();
        }
        if let Some(args) = &self.tool_args {
            config.tool_arguments = args.clone();
        }
        if let Some(version) = &self.protocol_version {
            config.protocol_version = version.clone();
        }
        if let Some(secs) = self.timeout {
            config.response_timeout_secs = secs;
        }
        if let Some(ms) = self.settle_ms {
            config.settle_delay_ms = ms;
        }

        Ok(config)
    }
}

fn parse_json_object(raw: &str) -> Result<serde_json::Value, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = mcp_conformance::init_tracing(cli.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {e}");
        return ExitCode::FAILURE;
    }

    let config = match cli.probe_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if config.command.is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "no server to test: pass a COMMAND, --jar, or a --config with `command`",
            )
            .exit();
    }

    // File settings were checked while loading, so what fails here came
    // from flags.
    if let Err(e) = config.validate() {
        Cli::command().error(ErrorKind::ValueValidation, e).exit();
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdout = std::io::stdout();
    let mut console = ConsoleReporter::new(stdout.lock(), cli.verbose);
    let mut quiet = NullReporter;
    let reporter: &mut dyn Reporter = if cli.json { &mut quiet } else { &mut console };

    let report = runtime.block_on(run_validation(&config, reporter));
    drop(console);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to encode report: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if report.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_jar_shortcut() {
        let cli = Cli::try_parse_from(["mcp-conformance", "--jar", "build/libs/app.jar"]).unwrap();
        let config = cli.probe_config().unwrap();
        assert_eq!(config.command, vec!["java", "-jar", "build/libs/app.jar"]);
    }

    #[test]
    fn test_trailing_command_and_overrides() {
        let cli = Cli::try_parse_from([
            "mcp-conformance",
            "--tool",
            "echo",
            "--tool-args",
            r#"{"text":"hi"}"#,
            "--timeout",
            "3",
            "--",
            "node",
            "dist/index.js",
            "--stdio",
        ])
        .unwrap();
        let config = cli.probe_config().unwrap();
        assert_eq!(config.command, vec!["node", "dist/index.js", "--stdio"]);
        assert_eq!(config.target_tool, "echo");
        assert_eq!(config.tool_arguments, serde_json::json!({"text": "hi"}));
        assert_eq!(config.response_timeout_secs, 3);
    }

    #[test]
    fn test_tool_args_must_be_object() {
        let err = Cli::try_parse_from(["mcp-conformance", "--tool-args", "[1]", "server"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    fn config_file(yaml: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_bad_config_file_is_a_runtime_error() {
        let file = config_file("command: [\"server\"]\nresponse_timeout_secs: 0\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["mcp-conformance", "--config", path]).unwrap();
        let err = cli.probe_config().unwrap_err();
        assert!(format!("{err:#}").contains("timeouts"));

        let file = config_file("tool_arguments: [1, 2]\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["mcp-conformance", "--config", path, "server"]).unwrap();
        assert!(cli.probe_config().is_err());
    }

    #[test]
    fn test_config_file_without_command_accepts_flag_command() {
        let file = config_file("target_tool: echo\n");
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["mcp-conformance", "--config", path, "--", "node", "index.js"]).unwrap();
        let config = cli.probe_config().unwrap();
        assert_eq!(config.command, vec!["node", "index.js"]);
        assert_eq!(config.target_tool, "echo");
    }

    #[test]
    fn test_no_command_leaves_config_empty() {
        let cli = Cli::try_parse_from(["mcp-conformance"]).unwrap();
        assert!(cli.probe_config().unwrap().command.is_empty());
    }
}
