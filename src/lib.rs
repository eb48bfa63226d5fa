//! run-orchestrator - lifecycle orchestration for decentralized container computations

pub mod cli;
pub mod core;
pub mod engine;
pub mod images;
pub mod notify;
pub mod orchestration;
pub mod persistence;

// Re-export commonly used types
pub use core::{
    OrchestratorConfig, OrchestratorError, PipelineDefinition, Run, RunFailure, RunStatus, RunType,
};
pub use engine::{PipelineEngine, PipelineUpdate, StartRequest, StartedPipeline};
pub use images::{DockerCliImageService, ImageAcquisition, ImageService};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use orchestration::{
    ObserverMessage, RunTicket, Session, SessionDependencies, SessionManager,
};
