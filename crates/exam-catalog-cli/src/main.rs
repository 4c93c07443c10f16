// crates/exam-catalog-cli/src/main.rs
// ============================================================================
// Module: Exam Catalog CLI Entry Point
// Description: Command dispatcher for serving and checking configuration.
// Purpose: Start the catalog HTTP server or validate its configuration.
// Dependencies: clap, exam-catalog-config, exam-catalog-server, tokio, tracing
// ============================================================================

//! ## Overview
//! `exam-catalog serve` resolves configuration (file, then environment),
//! installs the tracing subscriber, opens the configured store, and serves
//! until Ctrl-C. `exam-catalog config check` performs the same resolution and
//! validation without opening anything.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use exam_catalog_config::CatalogConfig;
use exam_catalog_config::DatabaseDriver;
use exam_catalog_config::LogFormat;
use exam_catalog_config::LoggingConfig;
use exam_catalog_server::CatalogServer;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "exam-catalog", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the catalog HTTP server.
    Serve(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Resolve and validate configuration, then print a summary.
    Check(ConfigArgs),
}

/// Shared `--config` flag.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file path (defaults to `EXAM_CATALOG_CONFIG` when set).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a printable message.
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
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the parsed command.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Config {
            command: ConfigCommand::Check(args),
        } => command_config_check(&args),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `serve`.
async fn command_serve(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    init_tracing(&config.logging)?;
    if let Some(source) = &config.source {
        tracing::info!(path = %source.display(), "configuration loaded");
    }
    let server = CatalogServer::from_config(config)
        .await
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config check`.
fn command_config_check(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    for line in summary(&config) {
        write_stdout_line(&line)
            .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads and validates configuration.
fn load_config(args: &ConfigArgs) -> CliResult<CatalogConfig> {
    CatalogConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Renders the resolved settings an operator usually wants to confirm.
fn summary(config: &CatalogConfig) -> Vec<String> {
    let source = config
        .source
        .as_ref()
        .map_or_else(|| "environment and defaults".to_string(), |path| path.display().to_string());
    let database = match config.database.driver {
        DatabaseDriver::Sqlite => config.database.path.display().to_string(),
        DatabaseDriver::Postgres => format!(
            "{}:{}/{}",
            config.database.host, config.database.port, config.database.name
        ),
    };
    vec![
        "config ok".to_string(),
        format!("source: {source}"),
        format!("environment: {}", config.server.environment.as_str()),
        format!("listen: {}:{}", config.server.host, config.server.port),
        format!("database: {} {database}", config.database.driver.as_str()),
        format!("csrf: {}", if config.server.csrf.enabled { "enabled" } else { "disabled" }),
        format!(
            "rate limit: {}",
            config.server.rate_limit.as_ref().map_or_else(
                || "off".to_string(),
                |limit| format!("{} per {}ms", limit.max_requests, limit.window.as_millis())
            )
        ),
    ]
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Builds the level filter; `RUST_LOG` wins over the configured level.
fn log_filter(logging: &LoggingConfig) -> CliResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(logging.level.trim())
        .map_err(|err| CliError::new(format!("invalid log level {}: {err}", logging.level)))
}

/// Installs the global tracing subscriber writing to stderr.
fn init_tracing(logging: &LoggingConfig) -> CliResult<()> {
    let filter = log_filter(logging)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match logging.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|err| CliError::new(format!("failed to install logger: {err}")))
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Reports an error and returns a failing exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
