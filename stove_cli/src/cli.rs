//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "stove", version, about = "Wood stove air valve controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/stove_config.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Control the stove until interrupted (Ctrl-C)
    Run {
        /// Stop on our own after this many seconds
        #[arg(long, value_name = "SECONDS")]
        duration_s: Option<u64>,
        /// Start with auto mode off; buttons still work
        #[arg(long, action = ArgAction::SetTrue)]
        manual: bool,
    },
    /// Feed a recorded `seconds,celsius` trace through the pipeline and rules
    Replay {
        /// CSV trace (strict header)
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Seconds between rule evaluations (default: auto_mode.poll_s)
        #[arg(long, value_name = "SECONDS")]
        poll_s: Option<u64>,
    },
    /// Quick health check: build the devices and read the sensor once
    SelfCheck,
}
