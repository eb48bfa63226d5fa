//! CLI output formatting

use crate::{
    core::RunStatus,
    images::{ImageInfo, DOWNLOAD_STATE},
    orchestration::ObserverMessage,
    persistence::RunRecord,
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "x ");

/// Create a spinner for a long-running operation
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Created => style("CREATED").dim().to_string(),
        RunStatus::AcquiringImages => style("ACQUIRING IMAGES").yellow().to_string(),
        RunStatus::Executing => style("EXECUTING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Errored => style("ERRORED").red().to_string(),
        RunStatus::Stopped => style("STOPPED").blue().to_string(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Format a history record for display
pub fn format_run_record(record: &RunRecord) -> String {
    let status_icon = match record.status {
        RunStatus::Completed => CHECK,
        RunStatus::Errored => CROSS,
        RunStatus::Stopped => STOP,
        RunStatus::Created | RunStatus::AcquiringImages | RunStatus::Executing => SPINNER,
    };

    let mut line = format!(
        "{} {} - {} - {} - {}",
        status_icon,
        style(short_id(&record.run_id)).dim(),
        style(&record.pipeline_id).bold(),
        format_status(record.status),
        style(record.created_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if let Some(message) = &record.error_message {
        line.push_str(&format!(" ({})", style(message).red()));
    }
    line
}

/// Format a cached image for display
pub fn format_image(image: &ImageInfo) -> String {
    format!(
        "  {} {} {}",
        style(short_id(&image.id)).dim(),
        style(image.reference()).bold(),
        style(image.size.as_deref().unwrap_or("")).dim()
    )
}

/// Text for an observer message, as shown next to a spinner
///
/// Returns `None` for messages with nothing to show.
pub fn format_observer_message(message: &ObserverMessage) -> Option<String> {
    match message {
        ObserverMessage::StateUpdate(update) => {
            let latest = update
                .controller_state
                .strip_prefix(DOWNLOAD_STATE)
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .unwrap_or(update.controller_state.as_str());
            Some(latest.to_string())
        }
        ObserverMessage::RunCompleted { run_id, .. } => {
            Some(format!("{} Run {} completed", CHECK, short_id(run_id)))
        }
        ObserverMessage::RunErrored { run_id, error, .. } => Some(format!(
            "{} Run {} failed: {}",
            CROSS,
            short_id(run_id),
            error.message
        )),
        ObserverMessage::RunStopped { run_id, .. } => {
            Some(format!("{} Run {} stopped", STOP, short_id(run_id)))
        }
        ObserverMessage::SaveLocalRun { .. } => None,
    }
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
