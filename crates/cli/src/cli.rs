//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// quota-relay - quota-driven batch generation over rotating API credentials
#[derive(Parser, Debug)]
#[command(
    name = "quota-relay",
    author,
    version,
    about = "Quota-driven batch generation over rotating API credentials",
    long_about = "Allocates a ranked backlog of work items across destinations with per-run \n\
                  targets, generating each item through credential-rotating, retrying \n\
                  dispatch under a session-wide circuit breaker."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "QUOTA_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "QUOTA_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Allocate the backlog across destinations
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "QUOTA_RELAY_CONFIG"
    )]
    pub config: PathBuf,

    /// Path to the work item backlog (JSON)
    #[arg(
        short,
        long,
        default_value = "backlog.json",
        env = "QUOTA_RELAY_BACKLOG"
    )]
    pub backlog: PathBuf,

    /// Use the local mock engine instead of calling services
    #[arg(long)]
    pub mock: bool,

    /// Share of mock calls that fail (with --mock)
    #[arg(long, default_value = "0.1", requires = "mock")]
    pub mock_failure_ratio: f64,

    /// Override the allocation RNG seed
    #[arg(long, env = "QUOTA_RELAY_SEED")]
    pub seed: Option<u64>,

    /// Validate configuration and backlog, then exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "QUOTA_RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show masked credentials per service
    #[arg(long)]
    pub credentials: bool,

    /// Show per-destination targets
    #[arg(long)]
    pub destinations: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
