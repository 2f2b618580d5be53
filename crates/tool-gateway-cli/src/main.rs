// crates/tool-gateway-cli/src/main.rs
// ============================================================================
// Module: Tool Gateway CLI Entry Point
// Description: Command dispatcher for serving and inspecting the tool gateway.
// Purpose: Run the gateway, validate config and routes, and issue test calls.
// Dependencies: clap, reqwest, tokio, tool-gateway, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `tool-gateway` binary starts the gateway server and offers offline
//! helpers for checking configuration and routing documents. `call` posts a
//! single tool call to a running gateway and prints the response envelope.
//! Results go to stdout, diagnostics and errors to stderr. Exit code is 0 on
//! success and 1 on any failure.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tool_gateway::GatewayServer;
use tool_gateway::TargetKind;
use tool_gateway::ToolCallEnvelope;
use tool_gateway::ToolClass;
use tool_gateway::classify;
use tool_gateway::resolve_target;
use tool_gateway_config::GatewayConfig;
use tool_gateway_config::RoutingConfig;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Gateway endpoint used by `call` when `--url` is omitted.
const DEFAULT_CALL_URL: &str = "http://127.0.0.1:4020/mcp";
/// Default client-side deadline for `call`.
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
/// Log filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tool-gateway", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the tool gateway server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Routing document utilities.
    Routes {
        /// Selected routes subcommand.
        #[command(subcommand)]
        command: RoutesCommand,
    },
    /// Send one tool call to a running gateway.
    Call(CallCommand),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to `TOOL_GATEWAY_CONFIG` or built-in defaults).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the routing document path.
    #[arg(long, value_name = "PATH")]
    routes: Option<PathBuf>,
    /// Override the listen address.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a gateway configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to `TOOL_GATEWAY_CONFIG` or built-in defaults).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Routes subcommands.
#[derive(Subcommand, Debug)]
enum RoutesCommand {
    /// Parse and validate a routing document.
    Check(RoutesSource),
    /// Show where a tool call would be routed.
    Resolve(RoutesResolveCommand),
}

/// Where to find the routing document.
#[derive(Args, Debug)]
struct RoutesSource {
    /// Routing document path (defaults to `routing.path` from the config).
    #[arg(long, value_name = "PATH")]
    routes: Option<PathBuf>,
    /// Optional config file consulted when `--routes` is omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `routes resolve`.
#[derive(Args, Debug)]
struct RoutesResolveCommand {
    /// Tool name to resolve.
    #[arg(long, value_name = "TOOL")]
    tool: String,
    /// Optional server hint for provider tools.
    #[arg(long, value_name = "SERVER")]
    server: Option<String>,
    /// Routing document location.
    #[command(flatten)]
    source: RoutesSource,
}

/// Arguments for `call`.
#[derive(Args, Debug)]
struct CallCommand {
    /// Gateway tool-call endpoint.
    #[arg(long, value_name = "URL", default_value = DEFAULT_CALL_URL)]
    url: String,
    /// Tool name.
    #[arg(long, value_name = "TOOL")]
    tool: String,
    /// Tool input as a JSON document.
    #[arg(long, value_name = "JSON")]
    input: Option<String>,
    /// Optional server hint for provider tools.
    #[arg(long, value_name = "SERVER")]
    server: Option<String>,
    /// Bearer token (defaults to the configured `auth.api_key`).
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,
    /// Client-side deadline in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    timeout_ms: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a human-readable message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(&command),
        Commands::Routes {
            command,
        } => command_routes(command),
        Commands::Call(command) => command_call(command).await,
    }
}

/// Prints the top-level help text.
fn show_help() -> CliResult<()> {
    let help = Cli::command().render_long_help().to_string();
    write_stdout_line(&help).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Installs the stderr log subscriber honoring `RUST_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Fails only when a subscriber is already installed.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    init_tracing();
    let mut config = load_config(command.config.as_deref())?;
    apply_serve_overrides(&mut config, command.routes, command.bind);
    let server = GatewayServer::from_config(config)
        .await
        .map_err(|err| CliError::new(format!("gateway init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("gateway failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Applies `serve` flag overrides on top of file and environment values.
fn apply_serve_overrides(
    config: &mut GatewayConfig,
    routes: Option<PathBuf>,
    bind: Option<String>,
) {
    if let Some(routes) = routes {
        config.routing.path = routes;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(command),
    }
}

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    write_stdout_line(&format!(
        "config ok: bind {} path {} routes {}",
        config.server.bind,
        config.server.gateway_path,
        config.routing.path.display()
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Routes Commands
// ============================================================================

/// Output of `routes resolve`.
#[derive(Debug, Serialize)]
struct ResolveOutput {
    /// Tool name as given.
    tool: String,
    /// Rate-limit class of the tool.
    class: ToolClass,
    /// Kind of upstream selected.
    target: TargetKind,
    /// Base URL the call would be posted to.
    address: String,
    /// Provider slug for provider targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    /// Server slug for provider targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
}

/// Dispatches routes subcommands.
fn command_routes(command: RoutesCommand) -> CliResult<ExitCode> {
    match command {
        RoutesCommand::Check(source) => command_routes_check(&source),
        RoutesCommand::Resolve(command) => command_routes_resolve(&command),
    }
}

/// Executes `routes check`.
fn command_routes_check(source: &RoutesSource) -> CliResult<ExitCode> {
    let (path, routes) = load_routes(source)?;
    write_stdout_line(&routes_summary(&path, &routes))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `routes resolve`.
fn command_routes_resolve(command: &RoutesResolveCommand) -> CliResult<ExitCode> {
    let (_, routes) = load_routes(&command.source)?;
    let output = resolve_output(&routes, &command.tool, command.server.as_deref())?;
    write_json_value(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves `tool` and describes the result.
fn resolve_output(
    routes: &RoutingConfig,
    tool: &str,
    server: Option<&str>,
) -> CliResult<ResolveOutput> {
    let target =
        resolve_target(routes, tool, server).map_err(|err| CliError::new(err.to_string()))?;
    let (provider, server) = target.provider.map_or((None, None), |(p, s)| (Some(p), Some(s)));
    Ok(ResolveOutput {
        tool: tool.to_string(),
        class: classify(tool),
        target: target.kind,
        address: target.address,
        provider,
        server,
    })
}

/// Renders the one-line `routes check` summary.
fn routes_summary(path: &Path, routes: &RoutingConfig) -> String {
    format!(
        "routes ok: {} (catalog {}, policy {}, {} providers, {} servers)",
        path.display(),
        routes.catalog.base_url,
        routes.policy.base_url,
        routes.providers.len(),
        routes.server_count()
    )
}

/// Loads the routing document named by `source`.
fn load_routes(source: &RoutesSource) -> CliResult<(PathBuf, RoutingConfig)> {
    let path = match &source.routes {
        Some(path) => path.clone(),
        None => load_config(source.config.as_deref())?.routing.path,
    };
    let routes = RoutingConfig::from_file(&path)
        .map_err(|err| CliError::new(format!("routes invalid: {err}")))?;
    Ok((path, routes))
}

// ============================================================================
// SECTION: Call Command
// ============================================================================

/// Executes `call`.
async fn command_call(command: CallCommand) -> CliResult<ExitCode> {
    let envelope = call_envelope(&command.tool, command.input.as_deref(), command.server)?;
    let api_key = match command.api_key {
        Some(key) => key,
        None => load_config(None)?.auth.api_key.expose().to_string(),
    };
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(command.timeout_ms))
        .build()
        .map_err(|err| CliError::new(format!("http client build failed: {err}")))?;
    let response = client
        .post(&command.url)
        .bearer_auth(api_key)
        .json(&envelope)
        .send()
        .await
        .map_err(|err| CliError::new(format!("request to {} failed: {err}", command.url)))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|err| CliError::new(format!("gateway returned invalid json: {err}")))?;
    write_json_value(&body)?;
    if status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Builds the request envelope for `call`.
fn call_envelope(
    tool: &str,
    input: Option<&str>,
    server: Option<String>,
) -> CliResult<ToolCallEnvelope> {
    let input = input
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|err| CliError::new(format!("--input is not valid json: {err}")))?;
    Ok(ToolCallEnvelope {
        tool: tool.to_string(),
        input,
        server,
    })
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Loads and validates the gateway configuration.
fn load_config(path: Option<&Path>) -> CliResult<GatewayConfig> {
    GatewayConfig::load(path).map_err(|err| CliError::new(format!("config invalid: {err}")))
}

/// Writes pretty JSON to stdout.
fn write_json_value<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("json render failed: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
