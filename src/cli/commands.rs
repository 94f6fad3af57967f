use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Main CLI structure for the speedwatch application
/// Uses clap's derive macros for automatic CLI generation
#[derive(Parser)]
#[command(author = "Kaipo Chen")]
#[command(version)] // Automatically uses version from Cargo.toml
#[command(about = "Internet Speed Test Tool - measure bandwidth and latency on demand or on a schedule")]
#[command(long_about = "Speedwatch measures internet download/upload throughput and ping latency \
against a measurement provider, validates the plausibility of every result, and keeps a local \
history with statistics, export, and retention commands. Tests run once from the command line \
or continuously on a schedule.")]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true, default_value = "speedwatch_config.json")]
    pub config: PathBuf,

    /// Result database path
    #[arg(long, global = true, default_value = "speedwatch_history.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands for the speedwatch application
#[derive(Subcommand)]
pub enum Commands {
    /// Run one speed test and print the results
    #[command(about = "Run a one-shot speed test")]
    #[command(long_about = "Checks connectivity, runs a retry-controlled speed test, prints the \
result, and saves valid results to the history database.\n\n\
Examples:\n  \
sw run                                # Human-readable output\n  \
sw run --json                         # Machine-readable output\n\n\
Exit code 0 on a valid result, 1 on connectivity failure or an invalid result.")]
    Run {
        /// Emit the final result as JSON instead of formatted text
        #[arg(long, help = "Print the result as JSON")]
        json: bool,
    },

    /// Run speed tests continuously on a fixed interval
    #[command(about = "Run scheduled speed tests")]
    #[command(long_about = "Starts a scheduler that runs a test immediately and then on every \
interval until the maximum runtime elapses or Ctrl+C is pressed. Valid results are saved to the \
history database.\n\n\
Examples:\n  \
sw schedule                           # Test every 60 minutes for 24 hours\n  \
sw schedule --interval 30             # Test every 30 minutes\n  \
sw schedule --immediate               # Run one scheduled-style test and exit")]
    Schedule {
        /// Minutes between tests
        #[arg(short, long, default_value = "60", help = "Test interval in minutes")]
        interval: u64,

        /// Maximum runtime in minutes before the scheduler exits
        #[arg(long, default_value = "1440", help = "Maximum runtime in minutes")]
        max_runtime: u64,

        /// Run a single scheduled-style test and exit
        #[arg(long, help = "Run one immediate test and exit")]
        immediate: bool,
    },

    /// Show statistics over recent test results
    #[command(about = "Show recent test statistics")]
    Stats {
        /// Number of days to analyze
        #[arg(short, long, default_value = "30", help = "Days to analyze")]
        days: u32,
    },

    /// List recent test results
    #[command(about = "Show recent test results")]
    History {
        /// Maximum number of results to show
        #[arg(short, long, default_value = "10", help = "Number of results to show")]
        limit: usize,
    },

    /// Export test results to a file
    #[command(about = "Export test results")]
    Export {
        /// Output format for the exported data
        #[arg(value_enum, help = "Export format")]
        format: ExportFormat,

        /// File path for the exported data
        #[arg(help = "Output file path")]
        output: PathBuf,

        /// Number of recent days to export (all results if omitted)
        #[arg(long, help = "Days to export (all if not specified)")]
        days: Option<u32>,
    },

    /// Show database information
    #[command(about = "Show database info")]
    Info,

    /// Delete results older than the retention horizon
    #[command(about = "Clean up old results")]
    Cleanup {
        /// Days of history to keep
        #[arg(long, default_value = "365", help = "Days of history to keep")]
        keep_days: u32,
    },

    /// Write a sample configuration file with the default settings
    #[command(about = "Create a sample configuration file")]
    CreateConfig,
}

/// Supported export file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}
