//! Observer-facing run events

use crate::core::{Run, RunFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Incremental progress/status record for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdateEvent {
    pub run_id: String,
    pub controller_state: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Everything pushed to the observer channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ObserverMessage {
    /// One-time record making the run visible regardless of outcome
    SaveLocalRun { run: Run },
    /// Download progress or relayed engine update
    StateUpdate(StateUpdateEvent),
    RunCompleted {
        run_id: String,
        results: serde_json::Value,
        end_date: DateTime<Utc>,
    },
    RunErrored {
        run_id: String,
        error: RunFailure,
        end_date: DateTime<Utc>,
    },
    RunStopped {
        run_id: String,
        end_date: DateTime<Utc>,
    },
}

impl ObserverMessage {
    pub fn run_id(&self) -> &str {
        match self {
            ObserverMessage::SaveLocalRun { run } => &run.id,
            ObserverMessage::StateUpdate(update) => &update.run_id,
            ObserverMessage::RunCompleted { run_id, .. }
            | ObserverMessage::RunErrored { run_id, .. }
            | ObserverMessage::RunStopped { run_id, .. } => run_id,
        }
    }

    /// Check if this is a terminal run record
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ObserverMessage::RunCompleted { .. }
                | ObserverMessage::RunErrored { .. }
                | ObserverMessage::RunStopped { .. }
        )
    }
}

/// Push side of the observer channel
///
/// Sends never block; messages queue on the receiving side.
#[derive(Debug, Clone)]
pub struct Observer {
    tx: mpsc::UnboundedSender<ObserverMessage>,
}

impl Observer {
    /// Create an observer and the receiver the presentation layer consumes
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ObserverMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, message: ObserverMessage) {
        if let Err(err) = self.tx.send(message) {
            debug!(run_id = err.0.run_id(), "Observer channel closed, dropping message");
        }
    }

    pub fn state_update(
        &self,
        run_id: &str,
        controller_state: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) {
        self.emit(ObserverMessage::StateUpdate(StateUpdateEvent {
            run_id: run_id.to_string(),
            controller_state: controller_state.into(),
            payload,
        }));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
