//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Prompt for a steplist before running
    #[arg(short, long)]
    pub interactive: bool,

    /// Steplist expression selecting which steps execute (e.g. "1-2,4,6")
    #[arg(short, long, conflicts_with = "interactive")]
    pub steps: Option<String>,

    /// Log file receiving a copy of all output (overrides the config value)
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Continue past failing steps
    #[arg(long)]
    pub ignore_failures: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
