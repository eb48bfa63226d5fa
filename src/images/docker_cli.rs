//! Image service backed by the docker CLI

use crate::core::ImageServiceError;
use crate::images::{
    ImageClientConfig, ImageInfo, ImagePull, ImageService, PullSignal, PullStream, RequiredImage,
    ServiceStatus,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Image service that shells out to `docker`
#[derive(Debug, Clone)]
pub struct DockerCliImageService {
    config: ImageClientConfig,
}

/// One line of `docker image ls --format '{{json .}}'`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageLsLine {
    #[serde(rename = "ID")]
    id: String,
    repository: String,
    tag: String,
    #[serde(default)]
    size: Option<String>,
}

impl DockerCliImageService {
    pub fn new(config: ImageClientConfig) -> Self {
        Self { config }
    }

    pub fn docker_path(&self) -> &str {
        self.config.docker_path()
    }

    /// Spawn `docker pull` and stream its stdout lines
    ///
    /// A spawn failure yields `NotStarted`; a non-zero exit closes the
    /// stream with `PullSignal::Error` carrying stderr.
    fn start_pull(&self, image: &str) -> PullStream {
        let spawned = Command::new(self.docker_path())
            .args(["pull", image])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(image, "Failed to spawn docker pull: {}", e);
                return PullStream::NotStarted {
                    message: format!("Failed to start docker pull: {}", e),
                    status_code: None,
                };
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(self.config.progress_buffer());
        let image = image.to_string();

        tokio::spawn(async move {
            // Drained on its own so a chatty stderr cannot stall stdout
            let stderr_task = tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_end(&mut buf).await;
                }
                String::from_utf8_lossy(&buf).into_owned()
            });

            if let Some(stdout) = stdout {
                let mut reader = BufReader::new(stdout);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf)
                                .trim_end_matches(['\r', '\n'])
                                .to_string();
                            if tx.send(PullSignal::Data(line)).await.is_err() {
                                // Receiver gone; dropping the child kills the pull
                                debug!(image = %image, "Pull progress receiver dropped");
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(image = %image, "Failed to read docker pull output: {}", e);
                            let _ = child.start_kill();
                            break;
                        }
                    }
                }
            }

            let signal = match child.wait().await {
                Ok(status) if status.success() => PullSignal::End,
                Ok(status) => {
                    let stderr_text = stderr_task.await.unwrap_or_default();
                    PullSignal::Error(format!(
                        "docker pull {} exited with code {}: {}",
                        image,
                        status.code().unwrap_or(-1),
                        stderr_text.trim()
                    ))
                }
                Err(e) => PullSignal::Error(format!("Failed to wait for docker pull {}: {}", image, e)),
            };
            let _ = tx.send(signal).await;
        });

        PullStream::Started(rx)
    }

    /// Run a docker command to completion and return stdout
    async fn run(&self, args: &[&str]) -> Result<String, ImageServiceError> {
        debug!("Running {} {}", self.docker_path(), args.join(" "));

        let output = Command::new(self.docker_path())
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ImageServiceError::Unavailable(format!(
                    "Failed to execute {}: {}",
                    self.docker_path(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImageServiceError::Command(format!(
                "docker {} exited with code {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ImageServiceError::Parse(format!("docker output is not UTF-8: {}", e)))
    }
}

fn parse_image_list(output: &str) -> Result<Vec<ImageInfo>, ImageServiceError> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let parsed: ImageLsLine = serde_json::from_str(line)
                .map_err(|e| ImageServiceError::Parse(format!("{}: {}", e, line)))?;
            Ok(ImageInfo {
                id: parsed.id,
                repository: parsed.repository,
                tag: parsed.tag,
                size: parsed.size,
            })
        })
        .collect()
}

#[async_trait]
impl ImageService for DockerCliImageService {
    async fn pull_images(&self, images: &[RequiredImage]) -> Result<Vec<ImagePull>, ImageServiceError> {
        Ok(images
            .iter()
            .map(|image| ImagePull {
                image_id: image.computation_id.clone(),
                image_name: image.reference.clone(),
                stream: self.start_pull(&image.reference),
            })
            .collect())
    }

    async fn pull_images_from_list(&self, images: &[String]) -> Result<Vec<PullStream>, ImageServiceError> {
        Ok(images.iter().map(|image| self.start_pull(image)).collect())
    }

    /// Removes dangling layers left behind when computation tags are re-pulled
    async fn prune_images(&self) -> Result<(), ImageServiceError> {
        self.run(&["image", "prune", "--force"]).await.map(|_| ())
    }

    async fn remove_image(&self, id: &str) -> Result<(), ImageServiceError> {
        self.run(&["rmi", id]).await.map(|_| ())
    }

    async fn get_images(&self) -> Result<Vec<ImageInfo>, ImageServiceError> {
        let output = self.run(&["image", "ls", "--format", "{{json .}}"]).await?;
        parse_image_list(&output)
    }

    async fn get_status(&self) -> Result<ServiceStatus, ImageServiceError> {
        match self.run(&["info", "--format", "{{.ServerVersion}}"]).await {
            Ok(_) => Ok(ServiceStatus { ready: true }),
            Err(ImageServiceError::Command(message)) => {
                debug!("Docker daemon not ready: {}", message);
                Ok(ServiceStatus { ready: false })
            }
            Err(e) => Err(e),
        }
    }
}
