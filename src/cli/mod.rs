//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    HistoryCommand, ImagesCommand, PruneCommand, PullCommand, StatusCommand, ValidateCommand,
};
use std::ffi::OsString;

/// Run orchestrator for decentralized container computations
#[derive(Debug, Parser, Clone)]
#[command(name = "run-orchestrator")]
#[command(version)]
#[command(about = "Resolve, pull and track container images for computation runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to orchestrator configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline definition and list the images it needs
    Validate(ValidateCommand),

    /// List locally cached images
    Images(ImagesCommand),

    /// Show container daemon readiness
    Status(StatusCommand),

    /// Pull every image a pipeline needs
    Pull(PullCommand),

    /// Remove unused images
    Prune(PruneCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
