mod cli;
mod core;
mod execution;

use anyhow::{Context, Result};
use cli::commands::{RunCommand, ValidateCommand};
use cli::output::*;
use cli::{Cli, Command};
use crate::core::config::PipelineConfig;
use crate::core::steplist::parse_steplist;
use crate::core::{PipelineError, RunStatus, Selection};
use execution::{EngineConfig, ExecutionEngine};
use std::path::PathBuf;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let mut pipeline = config.to_pipeline();
    if cmd.ignore_failures {
        pipeline.ignore_failure = true;
    }

    // resolve the selection up front so a bad --steps argument fails before
    // anything runs
    let selection = if cmd.interactive {
        Selection::Interactive
    } else if let Some(expr) = &cmd.steps {
        match parse_steplist(expr, pipeline.len()) {
            Ok(list) => Selection::Explicit(list),
            Err(e) => exit_malformed_selection(&e),
        }
    } else {
        Selection::All
    };

    let log = cmd
        .log
        .clone()
        .or_else(|| config.log.as_ref().map(PathBuf::from));
    let mut engine = ExecutionEngine::new(EngineConfig { log })?;

    println!("{} Starting {}", ROCKET, style(&pipeline.name).bold());
    let step_names = pipeline.step_names();

    let report = match engine.run(&mut pipeline, selection).await {
        Ok(report) => report,
        Err(e @ PipelineError::MalformedSelection { .. }) => exit_malformed_selection(&e),
        Err(e) => {
            println!("{} {}", CROSS, style(&e).red());
            error!("{}", e);
            std::process::exit(1);
        }
    };

    println!("\n{}", format_report(&report, &step_names));
    match report.status {
        RunStatus::Completed => {
            println!(
                "\n{} {} {}",
                CHECK,
                style(&report.run_id.to_string()[..8]).dim(),
                format_status(report.status)
            );
            Ok(())
        }
        RunStatus::Aborted { .. } => {
            println!("\n{} {}", CROSS, format_status(report.status));
            std::process::exit(1);
        }
        RunStatus::Interrupted => {
            println!("\n{} {}", WARN, format_status(report.status));
            std::process::exit(130);
        }
    }
}

/// Malformed steplist input is a usage error: diagnostic plus a non-zero
/// exit, never downgraded by ignore-failure mode.
fn exit_malformed_selection(err: &PipelineError) -> ! {
    eprintln!("{} {}", CROSS, style(err).red());
    std::process::exit(2);
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}
