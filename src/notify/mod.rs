//! Milestone notifications
//!
//! Sinks are fire-and-forget: `notify` must return without waiting on I/O.
//! Errors are reported back only so the caller can log them.

use thiserror::Error;
use tracing::info;

/// A milestone notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn started(run_id: &str, pipeline: &str) -> Self {
        Self::new("Pipeline started", format!("{} ({})", pipeline, run_id))
    }

    pub fn finished(run_id: &str, pipeline: &str) -> Self {
        Self::new("Pipeline finished", format!("{} ({})", pipeline, run_id))
    }

    pub fn errored(run_id: &str, pipeline: &str, message: &str) -> Self {
        Self::new("Pipeline error", format!("{} ({}): {}", pipeline, run_id, message))
    }

    pub fn stopped(run_id: &str, pipeline: &str) -> Self {
        Self::new("Pipeline stopped", format!("{} ({})", pipeline, run_id))
    }

    pub fn cleanup_failed(run_id: &str, message: &str) -> Self {
        Self::new("Cleanup failed", format!("run {}: {}", run_id, message))
    }
}

#[derive(Debug, Clone, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Notification sink
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Sink that writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(title = %notification.title, "{}", notification.body);
        Ok(())
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
