//! Release of run-scoped staged files

use crate::core::OrchestratorError;
use crate::engine::PipelineEngine;
use crate::notify::{Notification, Notifier};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What a cleanup call did
#[derive(Debug, Clone, PartialEq)]
pub enum CleanupOutcome {
    /// Staged files were released
    Released,
    /// A previous call already handled this run; nothing was touched
    AlreadyReleased,
    /// Release failed; logged and notified, never fatal
    Failed(OrchestratorError),
}

/// Releases each run's staged files at most once
///
/// Tracks one entry per run id started in the owning session. The set is
/// emptied when the session shuts down.
pub struct CleanupGuarantor {
    engine: Arc<dyn PipelineEngine>,
    notifier: Arc<dyn Notifier>,
    handled: Mutex<HashSet<String>>,
}

impl CleanupGuarantor {
    pub fn new(engine: Arc<dyn PipelineEngine>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            engine,
            notifier,
            handled: Mutex::new(HashSet::new()),
        }
    }

    /// Release staged files for `run_id`
    ///
    /// Only the first call for a run touches the filesystem, even if that
    /// call failed.
    pub async fn cleanup(&self, run_id: &str) -> CleanupOutcome {
        if !self.handled.lock().await.insert(run_id.to_string()) {
            debug!(run_id, "Staged files already released");
            return CleanupOutcome::AlreadyReleased;
        }

        match self.engine.unlink_files(run_id).await {
            Ok(()) => {
                info!(run_id, "Released staged files");
                CleanupOutcome::Released
            }
            Err(e) => {
                let err = OrchestratorError::Cleanup {
                    run_id: run_id.to_string(),
                    message: e.to_string(),
                };
                warn!(run_id, "{}", err);
                if let Err(notify_err) = self
                    .notifier
                    .notify(Notification::cleanup_failed(run_id, &e.to_string()))
                {
                    warn!(run_id, "{}", notify_err);
                }
                CleanupOutcome::Failed(err)
            }
        }
    }

    /// Check if cleanup has already run for `run_id`
    pub async fn is_handled(&self, run_id: &str) -> bool {
        self.handled.lock().await.contains(run_id)
    }

    /// Forget a finished run so a new run reusing its id gets released too
    pub(crate) async fn rearm(&self, run_id: &str) {
        self.handled.lock().await.remove(run_id);
    }

    /// Drop every tracked run id
    pub(crate) async fn clear(&self) {
        let mut handled = self.handled.lock().await;
        debug!(runs = handled.len(), "Clearing cleanup history");
        handled.clear();
    }
}
