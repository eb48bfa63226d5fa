//! CLI command definitions

use clap::Args;

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML or JSON file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List locally cached images
#[derive(Debug, Args, Clone)]
pub struct ImagesCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show container daemon readiness
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {}

/// Pull a pipeline's images
#[derive(Debug, Args, Clone)]
pub struct PullCommand {
    /// Path to pipeline YAML or JSON file
    #[arg(short, long)]
    pub file: String,

    /// Skip the prune after a successful pull
    #[arg(long)]
    pub no_prune: bool,
}

/// Remove unused images
#[derive(Debug, Args, Clone)]
pub struct PruneCommand {}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}
