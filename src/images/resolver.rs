//! Resolve the set of images a pipeline needs

use crate::core::{OrchestratorError, PipelineDefinition};
use std::collections::HashSet;

/// An image reference together with the computation that first required it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredImage {
    pub reference: String,
    pub computation_id: String,
}

/// Deduplicated image references in first-seen step order
///
/// Fails when a step has no image reference.
pub fn resolve_images(pipeline: &PipelineDefinition) -> Result<Vec<RequiredImage>, OrchestratorError> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for step in &pipeline.steps {
        let reference = match step.computation.image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() => image,
            _ => {
                return Err(OrchestratorError::Validation(format!(
                    "step '{}' has no computation image reference",
                    step.id
                )))
            }
        };

        if seen.insert(reference.to_string()) {
            images.push(RequiredImage {
                reference: reference.to_string(),
                computation_id: step.computation.id.clone(),
            });
        }
    }

    Ok(images)
}
