//! Run domain model

use crate::core::{
    error::{ErrorKind, OrchestratorError},
    pipeline::PipelineDefinition,
    state::RunStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Data mappings supplied by the caller (input name -> files/values)
pub type DataMappings = BTreeMap<String, serde_json::Value>;

/// Where a run was triggered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// Started on this machine; completion is reported to the observer
    Local,
    /// Triggered by a remote peer; completion is reported elsewhere
    Remote,
}

/// Structured terminal error carried by an errored run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    /// Original error as reported upstream
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// Input context the engine was processing, if any
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

impl RunFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
            error: None,
            input: None,
        }
    }
}

impl From<&OrchestratorError> for RunFailure {
    fn from(err: &OrchestratorError) -> Self {
        let mut failure = RunFailure::new(err.kind(), err.to_string());
        failure.error = Some(serde_json::Value::String(format!("{:?}", err)));
        if let OrchestratorError::Execution { input, .. } = err {
            failure.input = input.clone();
        }
        failure
    }
}

/// One execution attempt of a pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique run id
    pub id: String,

    /// Consortium the run belongs to
    pub consortium_id: String,

    /// Local or remote-triggered
    #[serde(rename = "type")]
    pub run_type: RunType,

    /// Pipeline being executed
    pub pipeline: Arc<PipelineDefinition>,

    /// Caller supplied data mappings
    #[serde(default)]
    pub data_mappings: DataMappings,

    /// Current lifecycle status
    pub status: RunStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,

    /// Results reported by the pipeline engine
    #[serde(default)]
    pub results: Option<serde_json::Value>,

    #[serde(default)]
    pub error: Option<RunFailure>,
}

impl Run {
    /// Create a run in the `Created` state
    pub fn new(
        id: impl Into<String>,
        consortium_id: impl Into<String>,
        run_type: RunType,
        pipeline: PipelineDefinition,
    ) -> Self {
        Self {
            id: id.into(),
            consortium_id: consortium_id.into(),
            run_type,
            pipeline: Arc::new(pipeline),
            data_mappings: DataMappings::new(),
            status: RunStatus::Created,
            created_at: Utc::now(),
            ended_at: None,
            results: None,
            error: None,
        }
    }

    /// Generate a fresh run id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn with_data_mappings(mut self, data_mappings: DataMappings) -> Self {
        self.data_mappings = data_mappings;
        self
    }

    pub fn is_local(&self) -> bool {
        self.run_type == RunType::Local
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline.id
    }
}
