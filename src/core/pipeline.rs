//! Pipeline definition domain model

use crate::core::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// An ordered sequence of computation steps
///
/// Immutable once a run has started; runs hold it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline identifier (used when forwarding stop requests)
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A single pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within the pipeline
    pub id: String,

    /// Computation this step runs
    pub computation: ComputationRef,

    /// Input wiring (variable name -> source description)
    #[serde(default, alias = "inputMap")]
    pub inputs: BTreeMap<String, serde_json::Value>,

    /// Controller options
    #[serde(default)]
    pub controller: ControllerOptions,
}

/// Reference to the computation a step runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationRef {
    /// Computation identifier
    pub id: String,

    /// Container image reference, e.g. `registry/name:tag`
    #[serde(default, alias = "dockerImage")]
    pub image: Option<String>,
}

/// How the step's controller drives the computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerOptions {
    /// Controller kind (`local`, `decentralized`)
    #[serde(default = "default_controller_kind", rename = "type")]
    pub kind: String,

    /// Number of iterations the controller runs
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_controller_kind() -> String {
    "local".to_string()
}

fn default_iterations() -> u32 {
    1
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            kind: default_controller_kind(),
            iterations: default_iterations(),
        }
    }
}

impl PipelineDefinition {
    /// Structural validation: non-empty unique step ids and positive iteration counts
    ///
    /// Missing image references are left for the image resolver to report.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(OrchestratorError::Validation(
                    "step with empty id".to_string(),
                ));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate step id: {}",
                    step.id
                )));
            }
            if step.controller.iterations == 0 {
                return Err(OrchestratorError::Validation(format!(
                    "step '{}' has an iteration count of zero",
                    step.id
                )));
            }
        }
        Ok(())
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

impl Step {
    /// Convenience constructor used by tests and tooling
    pub fn new(id: impl Into<String>, computation_id: impl Into<String>, image: Option<&str>) -> Self {
        Self {
            id: id.into(),
            computation: ComputationRef {
                id: computation_id.into(),
                image: image.map(str::to_string),
            },
            inputs: BTreeMap::new(),
            controller: ControllerOptions::default(),
        }
    }
}
