//! Pipeline engine contract
//!
//! The engine runs the computation containers and owns the staged files of
//! a run. The orchestrator only starts it, relays its updates, forwards stop
//! requests and asks it to release staged files.

use crate::core::{DataMappings, EngineError, ErrorKind, PipelineDefinition, RunFailure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// An "update" event emitted by the engine while a pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineUpdate {
    pub controller_state: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl PipelineUpdate {
    pub fn new(controller_state: impl Into<String>) -> Self {
        Self {
            controller_state: controller_state.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Engine rejection, with whatever upstream context it had
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }
}

impl From<ExecutionFailure> for RunFailure {
    fn from(failure: ExecutionFailure) -> Self {
        RunFailure {
            kind: ErrorKind::Execution,
            message: failure.message,
            stack: failure.stack,
            error: failure.error,
            input: failure.input,
        }
    }
}

/// Resolved engine results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResults {
    pub results: serde_json::Value,
}

/// Everything the engine needs to start a run
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub consortium_id: String,
    pub pipeline: Arc<PipelineDefinition>,
    pub files: DataMappings,
    pub run_id: String,
}

/// A started pipeline: its update stream and its eventual result
#[derive(Debug)]
pub struct StartedPipeline {
    /// Ordered update events; closed when the engine is done with the run
    pub updates: mpsc::Receiver<PipelineUpdate>,
    /// Resolves with results or rejects with an execution failure
    pub result: oneshot::Receiver<Result<PipelineResults, ExecutionFailure>>,
}

impl StartedPipeline {
    /// Create the engine-side handles for a new pipeline
    pub fn channel(
        buffer: usize,
    ) -> (
        mpsc::Sender<PipelineUpdate>,
        oneshot::Sender<Result<PipelineResults, ExecutionFailure>>,
        Self,
    ) {
        let (update_tx, updates) = mpsc::channel(buffer.max(1));
        let (result_tx, result) = oneshot::channel();
        (update_tx, result_tx, Self { updates, result })
    }
}

/// Pipeline engine consumed by the run state machine
#[async_trait]
pub trait PipelineEngine: Send + Sync {
    /// Start executing a pipeline for a run
    async fn start_pipeline(&self, request: StartRequest) -> Result<StartedPipeline, ExecutionFailure>;

    /// Ask the engine to halt a run's containers
    async fn request_stop(&self, pipeline_id: &str, run_id: &str) -> Result<(), EngineError>;

    /// Release the run's staged files
    async fn unlink_files(&self, run_id: &str) -> Result<(), EngineError>;
}
