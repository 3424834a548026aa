//! CLI output formatting

use crate::core::{RunReport, RunStatus, StepOutcome};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a single step outcome for display
pub fn format_outcome(outcome: StepOutcome) -> String {
    match outcome {
        StepOutcome::Passed => style("PASSED").green().to_string(),
        StepOutcome::Failed => style("FAILED").red().to_string(),
        StepOutcome::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Aborted { failed_step } => style(format!("ABORTED (step {})", failed_step))
            .red()
            .to_string(),
        RunStatus::Interrupted => style("INTERRUPTED").yellow().to_string(),
    }
}

/// Format the per-step summary lines of a finished run
pub fn format_report(report: &RunReport, step_names: &[String]) -> String {
    let mut lines = Vec::new();
    for (pos, outcome) in report.outcomes.iter().enumerate() {
        let name = step_names.get(pos).map(String::as_str).unwrap_or("?");
        lines.push(format!(
            "  {}: {} - {}",
            pos,
            style(name).bold(),
            format_outcome(*outcome)
        ));
    }
    for pos in report.outcomes.len()..step_names.len() {
        lines.push(format!(
            "  {}: {} - {}",
            pos,
            style(&step_names[pos]).bold(),
            style("NOT RUN").dim()
        ));
    }
    lines.join("\n")
}
