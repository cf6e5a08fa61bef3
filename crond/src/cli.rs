// Command line interface for the daemon.

use clap::Parser;
use std::path::PathBuf;

/// crond — a cron-compatible job scheduling daemon.
#[derive(Debug, Parser)]
#[command(name = "crond", version, about)]
pub struct Cli {
    /// Crontab files to load (system crontab format, with user field).
    #[arg(value_name = "CRONTAB")]
    pub crontabs: Vec<PathBuf>,

    /// Include files in directory as system crontabs (with user).
    #[arg(long = "include", value_name = "DIR")]
    pub include_cron_d: Vec<PathBuf>,

    /// Include executables in directory with dynamic time execution
    /// (TIME:DIR, e.g. 10m:/etc/periodic).
    #[arg(long = "run-parts", value_name = "TIME:DIR")]
    pub run_parts: Vec<String>,

    /// Include executables in directory with every minute execution.
    #[arg(long = "run-parts-1min", value_name = "DIR")]
    pub run_parts_1min: Vec<PathBuf>,

    /// Include executables in directory with every hour execution.
    #[arg(long = "run-parts-hourly", value_name = "DIR")]
    pub run_parts_hourly: Vec<PathBuf>,

    /// Include executables in directory with every day execution.
    #[arg(long = "run-parts-daily", value_name = "DIR")]
    pub run_parts_daily: Vec<PathBuf>,

    /// Include executables in directory with every week execution.
    #[arg(long = "run-parts-weekly", value_name = "DIR")]
    pub run_parts_weekly: Vec<PathBuf>,

    /// Include executables in directory with every month execution.
    #[arg(long = "run-parts-monthly", value_name = "DIR")]
    pub run_parts_monthly: Vec<PathBuf>,

    /// User for run-parts entries.
    #[arg(long, default_value = "root", value_name = "USER")]
    pub default_user: String,

    /// Log each execution and its outcome, not only failures.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    pub log_level: String,
}
