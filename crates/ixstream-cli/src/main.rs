//! ixstream CLI - replay versioned event streams into an index.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ixstream_core::config::LogFormat;
use ixstream_core::{Config, ConsumptionError, EventError, PipelineError};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, failed validation)
    ConfigError = 1,
    /// The consumer refused or could not apply a batch
    ConsumptionError = 2,
    /// Malformed input (unreadable file, bad JSON, missing key)
    InputError = 3,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting its source chain.
    fn from_error(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if let Some(err) = cause.downcast_ref::<ixstream_core::Error>() {
                return Self::from_core(err);
            }
            if let Some(err) = cause.downcast_ref::<PipelineError>() {
                return Self::from_pipeline(err);
            }
            if cause.downcast_ref::<ConsumptionError>().is_some() {
                return ExitCode::ConsumptionError;
            }
            if cause.downcast_ref::<EventError>().is_some()
                || cause.downcast_ref::<serde_json::Error>().is_some()
                || cause.downcast_ref::<std::io::Error>().is_some()
            {
                return ExitCode::InputError;
            }
            if cause.downcast_ref::<toml::de::Error>().is_some() {
                return ExitCode::ConfigError;
            }
        }
        ExitCode::RuntimeError
    }

    fn from_core(error: &ixstream_core::Error) -> Self {
        use ixstream_core::Error;

        match error {
            Error::Config(_) => ExitCode::ConfigError,
            Error::Consumption(_) | Error::Store(_) => ExitCode::ConsumptionError,
            Error::Event(_) | Error::Io(_) | Error::Serialization(_) => ExitCode::InputError,
            Error::Pipeline(err) => Self::from_pipeline(err),
            Error::Shutdown => ExitCode::SignalInterrupt,
        }
    }

    fn from_pipeline(error: &PipelineError) -> Self {
        match error {
            PipelineError::Rejected(_)
            | PipelineError::RetriesExhausted { .. }
            | PipelineError::Interleaved { .. } => ExitCode::ConsumptionError,
            _ => ExitCode::RuntimeError,
        }
    }
}

mod commands;

use commands::replay::OutputFormat;

#[derive(Parser)]
#[command(name = "ixstream")]
#[command(about = "Versioned event consumption for incremental indexing", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event file through the pipeline into a memory index
    Replay {
        /// Event file, one record per line
        #[arg(short, long)]
        input: PathBuf,

        /// Summary output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Best effort: a broken config is reported by the command itself
    let monitoring = cli
        .config
        .as_deref()
        .and_then(|path| Config::from_file(path).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_str()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so stdout carries only the command output
    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Replay { input, format } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            commands::replay::run(config, &input, format).await?;
        }

        Commands::Validate => {
            let path = cli
                .config
                .unwrap_or_else(|| PathBuf::from("ixstream.toml"));
            let config = Config::from_file(&path)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Load the given config file, or built-in defaults when none is named.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ixstream_core::{StoreError, Version};

    #[test]
    fn test_exit_code_from_core_errors() {
        let err = anyhow::Error::from(ixstream_core::Error::Config("bad".into()));
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);

        let err = anyhow::Error::from(ixstream_core::Error::Shutdown);
        assert_eq!(ExitCode::from_error(&err), ExitCode::SignalInterrupt);

        let err = anyhow::Error::from(ixstream_core::Error::Event(EventError::EmptyVersion));
        assert_eq!(ExitCode::from_error(&err), ExitCode::InputError);
    }

    #[test]
    fn test_exit_code_from_pipeline_errors() {
        let rejected = PipelineError::Rejected(ConsumptionError::StaleBatch {
            watermark: Version::from("5"),
            version: Version::from("4"),
        });
        let err = anyhow::Error::from(rejected);
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConsumptionError);

        let exhausted = PipelineError::RetriesExhausted {
            attempts: 4,
            source: ConsumptionError::Commit(StoreError::Unavailable("down".into())),
        };
        let err = anyhow::Error::from(ixstream_core::Error::from(exhausted));
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConsumptionError);

        let err = anyhow::Error::from(PipelineError::Task("panicked".into()));
        assert_eq!(ExitCode::from_error(&err), ExitCode::RuntimeError);
    }

    #[test]
    fn test_exit_code_through_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = anyhow::Error::from(io).context("Failed to open events.jsonl");
        assert_eq!(ExitCode::from_error(&err), ExitCode::InputError);

        let err = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::from_error(&err), ExitCode::RuntimeError);
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "ixstream", "-vv", "--config", "ix.toml", "replay", "--input", "e.jsonl", "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("ix.toml")));
        match cli.command {
            Commands::Replay { input, format } => {
                assert_eq!(input, PathBuf::from("e.jsonl"));
                assert_eq!(format, OutputFormat::Json);
            }
            Commands::Validate => panic!("expected replay"),
        }
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert!(config.consumer.validate_ordering);
    }
}
