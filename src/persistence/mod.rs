//! Persistence layer for run history
//!
//! Nothing is recorded unless the embedding application puts a recorder
//! in front of its session's observer stream. To feed the store the
//! `history` command reads:
//!
//! ```text
//! let store = Arc::new(SqliteRunStore::open(&config.history_db_path()).await?);
//! let events = session.take_events().context("observer stream already taken")?;
//! let (recorder, events) = spawn_recorder(store, events);
//! ```

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::{Run, RunStatus, RunType};
use crate::orchestration::ObserverMessage;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Summary of a run, as kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,

    pub pipeline_id: String,

    pub consortium_id: String,

    pub run_type: RunType,

    /// Last status seen on the observer channel
    pub status: RunStatus,

    pub created_at: DateTime<Utc>,

    /// When the run reached a terminal state
    pub ended_at: Option<DateTime<Utc>>,

    pub error_message: Option<String>,
}

impl RunRecord {
    pub fn from_run(run: &Run) -> Self {
        Self {
            run_id: run.id.clone(),
            pipeline_id: run.pipeline_id().to_string(),
            consortium_id: run.consortium_id.clone(),
            run_type: run.run_type,
            status: run.status,
            created_at: run.created_at,
            ended_at: run.ended_at,
            error_message: run.error.as_ref().map(|e| e.message.clone()),
        }
    }

    /// Fold a terminal observer message into the record
    pub fn apply(&mut self, message: &ObserverMessage) {
        match message {
            ObserverMessage::RunCompleted { end_date, .. } => {
                self.status = RunStatus::Completed;
                self.ended_at = Some(*end_date);
            }
            ObserverMessage::RunErrored {
                error, end_date, ..
            } => {
                self.status = RunStatus::Errored;
                self.ended_at = Some(*end_date);
                self.error_message = Some(error.message.clone());
            }
            ObserverMessage::RunStopped { end_date, .. } => {
                self.status = RunStatus::Stopped;
                self.ended_at = Some(*end_date);
            }
            ObserverMessage::SaveLocalRun { .. } | ObserverMessage::StateUpdate(_) => {}
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Insert or replace a run record
    async fn save_run(&self, record: &RunRecord) -> Result<()>;

    async fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Most recent runs first
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, record: &RunRecord) -> Result<()> {
        self.runs
            .write()
            .await
            .insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut records: Vec<RunRecord> = self.runs.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

/// Record run history from the observer channel
///
/// Every message is forwarded unchanged on the returned receiver, so the
/// recorder can sit between the session and the presentation layer. The
/// task ends once the session's observer sender is dropped on logout.
pub fn spawn_recorder(
    store: Arc<dyn PersistenceBackend>,
    mut events: mpsc::UnboundedReceiver<ObserverMessage>,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<ObserverMessage>) {
    let (tx, forwarded) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(message) = events.recv().await {
            if let Err(e) = record(store.as_ref(), &message).await {
                warn!(run_id = message.run_id(), "Failed to record run history: {:#}", e);
            }
            // Downstream may have gone away; keep recording regardless
            let _ = tx.send(message);
        }
        debug!("Observer channel closed, recorder exiting");
    });

    (task, forwarded)
}

async fn record(store: &dyn PersistenceBackend, message: &ObserverMessage) -> Result<()> {
    match message {
        ObserverMessage::SaveLocalRun { run } => store.save_run(&RunRecord::from_run(run)).await,
        ObserverMessage::StateUpdate(_) => Ok(()),
        terminal => match store.load_run(terminal.run_id()).await? {
            Some(mut existing) => {
                existing.apply(terminal);
                store.save_run(&existing).await
            }
            None => {
                debug!(run_id = terminal.run_id(), "No history for run, skipping");
                Ok(())
            }
        },
    }
}
