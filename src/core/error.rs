//! Error taxonomy for the orchestrator

use crate::core::state::{RunEvent, RunStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant shared by `OrchestratorError` and `RunFailure`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ImageAcquisition,
    Execution,
    Cleanup,
    NotFound,
    AlreadyRunning,
    SessionClosed,
    InvalidTransition,
    ImageService,
    Engine,
    Config,
}

/// Errors surfaced by orchestrator operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("invalid pipeline definition: {0}")]
    Validation(String),

    #[error("failed to acquire image {image}: {message}")]
    ImageAcquisition { image: String, message: String },

    #[error("pipeline execution failed: {message}")]
    Execution {
        message: String,
        input: Option<serde_json::Value>,
    },

    #[error("cleanup of run {run_id} failed: {message}")]
    Cleanup { run_id: String, message: String },

    #[error("no active run with id {0}")]
    NotFound(String),

    #[error("run {0} is already active")]
    AlreadyRunning(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("invalid transition from {from:?} on {event}")]
    InvalidTransition { from: RunStatus, event: &'static str },

    #[error(transparent)]
    ImageService(#[from] ImageServiceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Validation(_) => ErrorKind::Validation,
            OrchestratorError::ImageAcquisition { .. } => ErrorKind::ImageAcquisition,
            OrchestratorError::Execution { .. } => ErrorKind::Execution,
            OrchestratorError::Cleanup { .. } => ErrorKind::Cleanup,
            OrchestratorError::NotFound(_) => ErrorKind::NotFound,
            OrchestratorError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            OrchestratorError::SessionClosed => ErrorKind::SessionClosed,
            OrchestratorError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrchestratorError::ImageService(_) => ErrorKind::ImageService,
            OrchestratorError::Engine(_) => ErrorKind::Engine,
            OrchestratorError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid_transition(from: RunStatus, event: &RunEvent) -> Self {
        OrchestratorError::InvalidTransition {
            from,
            event: event.name(),
        }
    }
}

/// Errors reported by an image service implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageServiceError {
    #[error("container daemon unavailable: {0}")]
    Unavailable(String),

    #[error("image command failed: {0}")]
    Command(String),

    #[error("unexpected image service output: {0}")]
    Parse(String),
}

/// Errors reported by a pipeline engine implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no pipeline {pipeline_id} running for run {run_id}")]
    UnknownPipeline { pipeline_id: String, run_id: String },

    #[error("failed to release staged files: {0}")]
    Unlink(String),

    #[error("engine error: {0}")]
    Internal(String),
}
