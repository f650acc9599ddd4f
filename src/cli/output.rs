//! CLI output formatting

use console::Emoji;

use crate::core::run::{BuildRun, RunStatus, StepOutcome};
use crate::orchestrator::OrchestratorEvent;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Success => style("SUCCESS").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::TimedOut => style("TIMED OUT").red().to_string(),
        RunStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a step outcome for display
pub fn format_step_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Succeeded => style("ok").green().to_string(),
        StepOutcome::Failed { exit_code } => {
            style(format!("failed (exit {})", exit_code)).red().to_string()
        }
        StepOutcome::TimedOut { timeout_secs } => {
            style(format!("timed out after {}s", timeout_secs)).red().to_string()
        }
        StepOutcome::Cancelled => style("cancelled").yellow().to_string(),
        StepOutcome::NotRun { reason } => style(format!("not run: {}", reason)).dim().to_string(),
    }
}

/// One-line summary of a run
pub fn format_run_summary(run: &BuildRun) -> String {
    let status_icon = match run.status {
        RunStatus::Success => CHECK,
        RunStatus::Failed | RunStatus::TimedOut => CROSS,
        RunStatus::Running => SPINNER,
        _ => INFO,
    };

    let mut line = format!(
        "{} {} - {} #{} - {}",
        status_icon,
        style(&run.id.to_string()[..8]).dim(),
        style(&run.configuration_id).bold(),
        run.build_number,
        format_status(run.status)
    );
    if let Some(commit) = &run.commit {
        let short = &commit.revision[..commit.revision.len().min(8)];
        line.push_str(&format!(" - {}", style(short).cyan()));
    }
    if let Some(deployment) = &run.deployment_id {
        line.push_str(&format!(" - deploy {}", style(deployment).cyan()));
    }
    line
}

/// Format an orchestrator event for display
pub fn format_event(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::RunStarted {
            configuration_id,
            build_number,
            ..
        } => format!(
            "{} {} #{}",
            ROCKET,
            style(configuration_id).bold(),
            build_number
        ),
        OrchestratorEvent::RunFinished {
            configuration_id,
            build_number,
            status,
            ..
        } => {
            let icon = match status {
                RunStatus::Success => CHECK,
                _ => CROSS,
            };
            format!(
                "{} {} #{} - {}",
                icon,
                style(configuration_id).bold(),
                build_number,
                format_status(*status)
            )
        }
        OrchestratorEvent::RunSkipped {
            configuration_id,
            build_number,
            upstream,
        } => format!(
            "{} {} #{} skipped ({} did not succeed)",
            WARN,
            style(configuration_id).bold(),
            build_number,
            style(upstream).dim()
        ),
        OrchestratorEvent::DeploymentDispatched {
            configuration_id,
            deployment_id,
        } => match deployment_id {
            Some(id) => format!(
                "{} Deployment dispatched for {}: {}",
                ROCKET,
                style(configuration_id).bold(),
                style(id).cyan()
            ),
            None => format!(
                "{} Deployment dispatched for {}",
                ROCKET,
                style(configuration_id).bold()
            ),
        },
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_output_truncates() {
        let output = "a\nb\nc\nd\ne";
        let formatted = format_output(output, 2);
        assert!(formatted.contains("a\nb"));
        assert!(formatted.contains("3 more lines"));
        assert!(!formatted.contains("\ne"));
    }

    #[test]
    fn test_format_output_short_passthrough() {
        assert_eq!(format_output("a\nb", 5), "a\nb");
    }
}
