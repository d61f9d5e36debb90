//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Backpressure - priority-lane admission control and load shedding
#[derive(Parser, Debug)]
#[command(
    name = "backpressure",
    author,
    version,
    about = "Priority-lane admission control and load shedding",
    long_about = "Drives a backpressure manager with a synthetic mixed-priority load.\n\n\
                  Operations are admitted into five bounded priority lanes, shed by \n\
                  load state, and dispatched by a continuous budgeted loop."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BACKPRESSURE_VERBOSE")]
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
        env = "BACKPRESSURE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a manager against a synthetic load and report statistics
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "BACKPRESSURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// How long to generate load, in seconds
    #[arg(long, default_value = "5", env = "BACKPRESSURE_DURATION")]
    pub duration: u64,

    /// Submission rate in operations per second
    #[arg(long, default_value = "5000", env = "BACKPRESSURE_RATE")]
    pub rate: u64,

    /// Make every n-th operation fail on every attempt (0 = never)
    #[arg(long, default_value = "0", env = "BACKPRESSURE_FAIL_EVERY")]
    pub fail_every: u64,

    /// Simulated cost of each work unit in microseconds
    #[arg(long, default_value = "0", env = "BACKPRESSURE_WORK_COST_US")]
    pub work_cost_us: u64,

    /// Override `max_ops_per_cycle` from configuration
    #[arg(long, env = "BACKPRESSURE_MAX_OPS_PER_CYCLE")]
    pub max_ops_per_cycle: Option<usize>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BACKPRESSURE_METRICS_PORT")]
    pub metrics_port: u16,

    /// Print final statistics as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "backpressure.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
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
