//! Session-scoped map of live runs

use crate::core::{OrchestratorError, RunStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

/// Requests delivered to a running state machine
#[derive(Debug)]
pub(crate) enum Control {
    Stop {
        pipeline_id: String,
        ack: oneshot::Sender<Result<(), OrchestratorError>>,
    },
}

/// Handle to a live run, as stored in the registry
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    pipeline_id: String,
    status: watch::Receiver<RunStatus>,
    control: mpsc::UnboundedSender<Control>,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: String,
        pipeline_id: String,
        status: watch::Receiver<RunStatus>,
        control: mpsc::UnboundedSender<Control>,
    ) -> Self {
        Self {
            run_id,
            pipeline_id,
            status,
            control,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Current status
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Ask the run to stop and wait until it has reached `Stopped`
    ///
    /// Fails with `NotFound` if the run finished before it saw the request.
    pub async fn request_stop(&self, pipeline_id: &str) -> Result<(), OrchestratorError> {
        let (ack, done) = oneshot::channel();
        self.control
            .send(Control::Stop {
                pipeline_id: pipeline_id.to_string(),
                ack,
            })
            .map_err(|_| OrchestratorError::NotFound(self.run_id.clone()))?;

        done.await
            .map_err(|_| OrchestratorError::NotFound(self.run_id.clone()))?
    }
}

/// Run id -> live run handle
///
/// Entries are added and removed only by the owning state machine.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<String, Arc<RunHandle>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, handle: Arc<RunHandle>) -> Result<(), OrchestratorError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(handle.run_id()) {
            return Err(OrchestratorError::AlreadyRunning(handle.run_id().to_string()));
        }
        runs.insert(handle.run_id().to_string(), handle);
        Ok(())
    }

    pub(crate) async fn remove(&self, run_id: &str) -> Option<Arc<RunHandle>> {
        self.runs.write().await.remove(run_id)
    }

    pub(crate) async fn drain(&self) -> Vec<Arc<RunHandle>> {
        self.runs.write().await.drain().map(|(_, handle)| handle).collect()
    }

    pub async fn get(&self, run_id: &str) -> Option<Arc<RunHandle>> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// Look up a run, failing with `NotFound`
    pub async fn lookup(&self, run_id: &str) -> Result<Arc<RunHandle>, OrchestratorError> {
        self.get(run_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(run_id.to_string()))
    }

    pub async fn contains(&self, run_id: &str) -> bool {
        self.runs.read().await.contains_key(run_id)
    }

    pub async fn active_run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}
