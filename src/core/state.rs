//! Run lifecycle states and the transition table

use crate::core::{error::OrchestratorError, run::RunFailure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Registered, nothing done yet
    Created,
    /// Pulling the container images the pipeline needs
    AcquiringImages,
    /// Pipeline engine is running the computation
    Executing,
    /// Engine resolved with results
    Completed,
    /// Validation, acquisition or execution failed
    Errored,
    /// Stopped by an external request
    Stopped,
}

impl RunStatus {
    /// Check if no further transitions can occur
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Errored | RunStatus::Stopped
        )
    }

    /// Position in the lifecycle; transitions only ever increase it
    pub fn rank(&self) -> u8 {
        match self {
            RunStatus::Created => 0,
            RunStatus::AcquiringImages => 1,
            RunStatus::Executing => 2,
            RunStatus::Completed | RunStatus::Errored | RunStatus::Stopped => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::AcquiringImages => "acquiring_images",
            RunStatus::Executing => "executing",
            RunStatus::Completed => "completed",
            RunStatus::Errored => "errored",
            RunStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(RunStatus::Created),
            "acquiring_images" => Ok(RunStatus::AcquiringImages),
            "executing" => Ok(RunStatus::Executing),
            "completed" => Ok(RunStatus::Completed),
            "errored" => Ok(RunStatus::Errored),
            "stopped" => Ok(RunStatus::Stopped),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Inputs that drive the run lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Run was submitted
    Begin,
    /// Every required image is available locally
    ImagesAcquired,
    /// Resolution or pulling failed
    AcquisitionFailed(RunFailure),
    /// Engine resolved
    ExecutionSucceeded { results: serde_json::Value },
    /// Engine rejected (or could not start)
    ExecutionFailed(RunFailure),
    /// External stop request
    StopRequested,
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Begin => "begin",
            RunEvent::ImagesAcquired => "images_acquired",
            RunEvent::AcquisitionFailed(_) => "acquisition_failed",
            RunEvent::ExecutionSucceeded { .. } => "execution_succeeded",
            RunEvent::ExecutionFailed(_) => "execution_failed",
            RunEvent::StopRequested => "stop_requested",
        }
    }
}

/// Side effects requested by a transition, performed in order by the run machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Push the one-time `save-local-run` record
    SaveLocalRun,
    /// Resolve and pull the pipeline's images
    AcquireImages,
    /// Hand the pipeline to the engine and relay its updates
    StartPipeline,
    /// Forward the stop request to the engine
    ForwardStop,
    /// Release staged files
    Cleanup,
    EmitCompleted,
    EmitErrored,
    EmitStopped,
}

/// Result of applying an event to a status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: RunStatus,
    pub to: RunStatus,
    pub effects: Vec<Effect>,
}

/// Compute the next status and the side effects for an event
///
/// Terminal transitions always list `Cleanup` before their emit effect.
pub fn transition(state: RunStatus, event: &RunEvent) -> Result<Transition, OrchestratorError> {
    use Effect::*;

    let (to, effects) = match (state, event) {
        (RunStatus::Created, RunEvent::Begin) => {
            (RunStatus::AcquiringImages, vec![SaveLocalRun, AcquireImages])
        }
        (RunStatus::AcquiringImages, RunEvent::ImagesAcquired) => {
            (RunStatus::Executing, vec![StartPipeline])
        }
        (RunStatus::AcquiringImages, RunEvent::AcquisitionFailed(_)) => {
            (RunStatus::Errored, vec![Cleanup, EmitErrored])
        }
        (RunStatus::Executing, RunEvent::ExecutionSucceeded { .. }) => {
            (RunStatus::Completed, vec![Cleanup, EmitCompleted])
        }
        (RunStatus::Executing, RunEvent::ExecutionFailed(_)) => {
            (RunStatus::Errored, vec![Cleanup, EmitErrored])
        }
        (
            RunStatus::Created | RunStatus::AcquiringImages | RunStatus::Executing,
            RunEvent::StopRequested,
        ) => (RunStatus::Stopped, vec![ForwardStop, Cleanup, EmitStopped]),
        (from, event) => return Err(OrchestratorError::invalid_transition(from, event)),
    };

    Ok(Transition {
        from: state,
        to,
        effects,
    })
}
