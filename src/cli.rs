//! CLI argument parsing for the replay harness.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for replayed records and spans
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON lines for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "linaje")]
#[command(version)]
#[command(about = "Replay probe event scripts through the task-lineage correlation engine", long_about = None)]
pub struct Cli {
    /// JSON-lines script of scheduler transitions and probe events
    pub script: PathBuf,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Uniform capacity override for every engine store
    #[arg(long = "capacity", value_name = "N")]
    pub capacity: Option<usize>,

    /// Print channel statistics after the replay
    #[arg(long = "stats")]
    pub stats: bool,

    /// Enable debug output
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}
