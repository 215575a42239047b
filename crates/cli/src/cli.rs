//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::OverflowPolicy;
use std::path::PathBuf;

/// multicapture - synchronized frame capture from several sources
#[derive(Parser, Debug)]
#[command(
    name = "multicapture",
    author,
    version,
    about = "Synchronized multi-source frame capture",
    long_about = "Captures frames from several video sources on one shared clock.\n\n\
                  Every cycle each source is asked for its current frame; the answers \n\
                  are published as one batch ordered like the sources, with failed or \n\
                  late sources marked as missing."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MULTICAPTURE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MULTICAPTURE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture synchronized batches
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Source addresses; replace the sources of the configuration file
    #[arg(value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "MULTICAPTURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target batches per second
    #[arg(long, env = "MULTICAPTURE_FPS")]
    pub fps: Option<u32>,

    /// Output channel capacity in batches
    #[arg(long)]
    pub output_capacity: Option<usize>,

    /// What to drop when the consumer falls behind
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowArg>,

    /// Maximum number of batches to consume (0 = unlimited)
    #[arg(long, default_value = "0", env = "MULTICAPTURE_MAX_BATCHES")]
    pub max_batches: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "MULTICAPTURE_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without capturing
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "MULTICAPTURE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "capture.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "capture.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List every source with its address
    #[arg(long)]
    pub sources: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Overflow policy as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OverflowArg {
    /// Keep queued batches, discard the new one
    DropNewest,
    /// Evict the oldest queued batch
    DropOldest,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::DropNewest => Self::DropNewest,
            OverflowArg::DropOldest => Self::DropOldest,
        }
    }
}
