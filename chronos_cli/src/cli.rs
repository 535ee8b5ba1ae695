//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "chronos", version, about = "Photogate timer CLI")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Settings CSV (strict `key,value` header); overrides [settings].path
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an experiment against the simulated expander
    Simulate {
        /// Experiment mode: CV, Photogate, UA, FreeFall, Incline, Tachometer
        #[arg(long, value_name = "MODE")]
        mode: String,
        /// Number of runs to record
        #[arg(long, default_value_t = 3)]
        runs: u32,
        /// How long the beam stays interrupted per gate pass
        #[arg(long, value_name = "MS", default_value_t = 60)]
        pass_ms: u64,
        /// Time between leaving gate A and reaching gate B
        #[arg(long, value_name = "MS", default_value_t = 200)]
        gap_ms: u64,
        /// Write the run history CSV here when done
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },
    /// Bring up the expander and read the gate inputs once
    SelfCheck,
    /// Inspect or change persisted experiment settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print every setting
    List,
    /// Print one setting
    Get { key: String },
    /// Validate, store and persist one setting
    Set {
        key: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
}
