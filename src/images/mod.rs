//! Container image resolution and acquisition

pub mod client;
pub mod coordinator;
pub mod docker_cli;
pub mod resolver;

use crate::core::ImageServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use client::ImageClientConfig;
pub use coordinator::{AcquisitionReport, ImageAcquisition, DOWNLOAD_STATE};
pub use docker_cli::DockerCliImageService;
pub use resolver::{resolve_images, RequiredImage};

/// One signal from a running pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullSignal {
    /// A progress line
    Data(String),
    /// Pull finished successfully
    End,
    /// Pull failed
    Error(String),
}

/// Progress source for a single pull
///
/// `Started` is an ordered single-producer channel; the producer closes it
/// with `End` or `Error`. A pull that could never start is reported as
/// `NotStarted` instead.
#[derive(Debug)]
pub enum PullStream {
    Started(mpsc::Receiver<PullSignal>),
    NotStarted {
        message: String,
        status_code: Option<u16>,
    },
}

/// A pull issued for one required image
#[derive(Debug)]
pub struct ImagePull {
    /// Computation the image belongs to
    pub image_id: String,
    /// Image reference being pulled
    pub image_name: String,
    pub stream: PullStream,
}

/// Locally cached image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub repository: String,
    pub tag: String,
    #[serde(default)]
    pub size: Option<String>,
}

impl ImageInfo {
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Container daemon readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub ready: bool,
}

/// Image service contract consumed by the orchestrator
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Start pulling every required image, one stream per image
    async fn pull_images(&self, images: &[RequiredImage]) -> Result<Vec<ImagePull>, ImageServiceError>;

    /// Start pulling a plain list of image references
    async fn pull_images_from_list(&self, images: &[String]) -> Result<Vec<PullStream>, ImageServiceError>;

    /// Remove cached images no known computation references
    async fn prune_images(&self) -> Result<(), ImageServiceError>;

    async fn remove_image(&self, id: &str) -> Result<(), ImageServiceError>;

    async fn get_images(&self) -> Result<Vec<ImageInfo>, ImageServiceError>;

    async fn get_status(&self) -> Result<ServiceStatus, ImageServiceError>;
}
