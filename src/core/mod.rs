//! Core domain models
//!
//! Pipeline definitions, runs, the run lifecycle and the error taxonomy.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod run;
pub mod state;

pub use config::OrchestratorConfig;
pub use error::{EngineError, ErrorKind, ImageServiceError, OrchestratorError};
pub use pipeline::*;
pub use run::*;
pub use state::*;
