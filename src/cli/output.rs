//! CLI output formatting

use crate::{
    core::{RunStatus, SecurityMode, StepStatus},
    execution::{ExecutionResult, ForkLogSummary, ForkStatus, RunEvent, Termination},
    variables::VariableEntry,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Spinner shown while a command runs without live output
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format how a process ended
pub fn format_termination(termination: Termination) -> String {
    match termination {
        Termination::Exited { code: 0 } => style("exit 0").green().to_string(),
        Termination::Exited { code } => style(format!("exit {}", code)).red().to_string(),
        Termination::TimedOut { .. } | Termination::Cancelled | Termination::Signaled { .. } => {
            style(termination.to_string()).yellow().to_string()
        }
    }
}

/// One-line summary of a result
pub fn format_result_line(result: &ExecutionResult) -> String {
    let icon = if result.success() { CHECK } else { CROSS };
    format!(
        "{} {} ({}, {})",
        icon,
        style(result.command()).bold(),
        format_termination(result.termination()),
        style(format_duration(result.duration())).dim()
    )
}

/// Header printed before replayed output
pub fn format_replay_header(result: &ExecutionResult) -> String {
    format!(
        "--- Replay: {} ({}) ---",
        result.command(),
        format_termination(result.termination())
    )
}

pub fn format_mode(mode: SecurityMode) -> String {
    match mode {
        SecurityMode::Open => style("open").yellow().to_string(),
        SecurityMode::Strict => style("strict").green().to_string(),
    }
}

pub fn format_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::CompletedWithFailures => style("COMPLETED WITH FAILURES").yellow().to_string(),
        RunStatus::Aborted => style("ABORTED").red().to_string(),
    }
}

pub fn format_step_status(status: &StepStatus) -> String {
    match status {
        StepStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        StepStatus::Failed { .. } => style("FAILED").red().to_string(),
        StepStatus::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run event for display
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({} steps, {})",
            ROCKET,
            style(pipeline_name).bold(),
            total_steps,
            style(&execution_id.to_string()[..8]).dim()
        ),
        RunEvent::StepSkipped { step, reason } => {
            format!("{} {} ({})", SKIP, style(step).dim(), style(reason).dim())
        }
        RunEvent::StepStarted { step, command } => match command {
            Some(command) => format!("{} {}: {}", SPINNER, style(step).cyan(), style(command).dim()),
            None => format!("{} {}", SPINNER, style(step).cyan()),
        },
        RunEvent::StepLog { step, message } => {
            format!("  [{}] {}", style(step).dim(), message)
        }
        RunEvent::StepSucceeded { step } => format!("{} {}", CHECK, style(step).green()),
        RunEvent::StepFailed { step, reason } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(reason).dim())
        }
        RunEvent::PipelineFinished { execution_id, status } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_run_status(*status)
        ),
    }
}

pub fn format_variable(entry: &VariableEntry) -> String {
    format!(
        "  {} = {}  {}",
        style(&entry.name).cyan(),
        entry.value,
        style(format!("[{}]", entry.layer)).dim()
    )
}

pub fn format_fork_summary(summary: &ForkLogSummary) -> String {
    let status = match summary.status {
        ForkStatus::Running => style("running".to_string()).yellow(),
        ForkStatus::Exited { code: 0 } => style("exit 0".to_string()).green(),
        ForkStatus::Exited { code } => style(format!("exit {}", code)).red(),
    };
    format!(
        "  {}  {}  {}  {}",
        style(&summary.id).dim(),
        style(&summary.name).bold(),
        summary.started,
        status
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format output with truncation
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
