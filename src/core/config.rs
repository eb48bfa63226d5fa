//! Orchestrator configuration and pipeline definition loading

use crate::core::PipelineDefinition;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Orchestrator settings, loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often download progress is pushed to observers (milliseconds)
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Prune stale images after a successful acquisition
    #[serde(default = "default_true")]
    pub prune_after_pull: bool,

    /// Path to the docker executable
    #[serde(default = "default_docker_path")]
    pub docker_path: String,

    /// Location of the run history database
    #[serde(default)]
    pub history_db: Option<PathBuf>,

    /// Whether milestone notifications are delivered
    #[serde(default = "default_true")]
    pub notifications: bool,
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_docker_path() -> String {
    "docker".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval_ms(),
            prune_after_pull: true,
            docker_path: default_docker_path(),
            history_db: None,
            notifications: true,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: OrchestratorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            anyhow::bail!("progress_interval_ms must be greater than zero");
        }
        if self.docker_path.trim().is_empty() {
            anyhow::bail!("docker_path must not be empty");
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Resolved history database path
    pub fn history_db_path(&self) -> PathBuf {
        match &self.history_db {
            Some(path) => path.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("run-orchestrator")
                .join("runs.db"),
        }
    }
}

impl PipelineDefinition {
    /// Load a pipeline definition from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse a pipeline definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parse a pipeline definition from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }
}
