//! Concurrent image acquisition
//!
//! All pulls are issued at once and drained to completion; the first pull to
//! fail decides the outcome, but the others still finish before `acquire`
//! returns. Download progress is pushed to the observer on a fixed interval.

use crate::{
    core::OrchestratorError,
    images::{ImageService, PullSignal, PullStream, RequiredImage},
    orchestration::events::Observer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Controller state reported while images are downloading
pub const DOWNLOAD_STATE: &str = "Downloading required docker images";

/// Summary of a successful acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Image references that were pulled
    pub pulled: Vec<String>,
    /// Whether the post-pull prune succeeded
    pub pruned: bool,
}

/// Settled result of one pull
#[derive(Debug)]
struct PullOutcome {
    image: String,
    result: Result<(), String>,
}

/// A progress line tagged with the image it came from
#[derive(Debug, Clone, PartialEq)]
struct Progress {
    image: String,
    line: String,
}

/// Pulls a set of images concurrently and aggregates the outcome
pub struct ImageAcquisition {
    service: Arc<dyn ImageService>,
    progress_interval: Duration,
    prune: bool,
}

impl ImageAcquisition {
    pub fn new(service: Arc<dyn ImageService>, progress_interval: Duration) -> Self {
        Self {
            service,
            progress_interval,
            prune: true,
        }
    }

    /// Enable or disable the post-pull prune
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Pull every image, reporting progress for `run_id`
    pub async fn acquire(
        &self,
        run_id: &str,
        images: &[RequiredImage],
        observer: &Observer,
    ) -> Result<AcquisitionReport, OrchestratorError> {
        info!(run_id, count = images.len(), "Acquiring images");

        let pulls = self.service.pull_images(images).await.map_err(|e| {
            OrchestratorError::ImageAcquisition {
                image: joined_references(images),
                message: e.to_string(),
            }
        })?;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
        let mut tasks: JoinSet<PullOutcome> = JoinSet::new();
        let mut first_failure: Option<OrchestratorError> = None;
        let mut pulled = Vec::with_capacity(pulls.len());

        for pull in pulls {
            match pull.stream {
                PullStream::NotStarted {
                    message,
                    status_code,
                } => {
                    warn!(
                        run_id,
                        image = %pull.image_name,
                        ?status_code,
                        "Image pull could not start: {}",
                        message
                    );
                    first_failure.get_or_insert(OrchestratorError::ImageAcquisition {
                        image: pull.image_name,
                        message,
                    });
                }
                PullStream::Started(rx) => {
                    pulled.push(pull.image_name.clone());
                    tasks.spawn(drain_pull(pull.image_name, rx, progress_tx.clone()));
                }
            }
        }
        // Only the spawned pulls hold senders now, so the progress channel
        // closes once every pull has settled.
        drop(progress_tx);

        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut latest: Option<Progress> = None;
        let mut reported: Option<Option<Progress>> = None;

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if reported.as_ref() != Some(&latest) {
                        report_progress(observer, run_id, latest.as_ref());
                        reported = Some(latest.clone());
                    }
                }
                Some(progress) = progress_rx.recv() => {
                    latest = Some(progress);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(outcome)) => match outcome.result {
                        Ok(()) => debug!(run_id, image = %outcome.image, "Image pull finished"),
                        Err(message) => {
                            warn!(run_id, image = %outcome.image, "Image pull failed: {}", message);
                            first_failure.get_or_insert(OrchestratorError::ImageAcquisition {
                                image: outcome.image,
                                message,
                            });
                        }
                    },
                    Some(Err(join_err)) => {
                        warn!(run_id, "Image pull task aborted: {}", join_err);
                        first_failure.get_or_insert(OrchestratorError::ImageAcquisition {
                            image: "unknown".to_string(),
                            message: join_err.to_string(),
                        });
                    }
                },
            }
        }

        while let Ok(progress) = progress_rx.try_recv() {
            latest = Some(progress);
        }
        if reported.as_ref() != Some(&latest) {
            report_progress(observer, run_id, latest.as_ref());
        }

        if let Some(failure) = first_failure {
            return Err(failure);
        }

        let pruned = if self.prune {
            match self.service.prune_images().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(run_id, "Image prune failed: {}", e);
                    false
                }
            }
        } else {
            false
        };

        info!(run_id, count = pulled.len(), "Images acquired");
        Ok(AcquisitionReport { pulled, pruned })
    }
}

/// Bridge one pull's signals into a single settled outcome
async fn drain_pull(
    image: String,
    mut rx: mpsc::Receiver<PullSignal>,
    progress: mpsc::UnboundedSender<Progress>,
) -> PullOutcome {
    while let Some(signal) = rx.recv().await {
        match signal {
            PullSignal::Data(line) => {
                let _ = progress.send(Progress {
                    image: image.clone(),
                    line,
                });
            }
            PullSignal::End => {
                return PullOutcome {
                    image,
                    result: Ok(()),
                }
            }
            PullSignal::Error(message) => {
                return PullOutcome {
                    image,
                    result: Err(message),
                }
            }
        }
    }

    // Producer went away without an explicit signal
    PullOutcome {
        image,
        result: Ok(()),
    }
}

fn report_progress(observer: &Observer, run_id: &str, latest: Option<&Progress>) {
    match latest {
        Some(progress) => observer.state_update(
            run_id,
            format!("{}\n{}", DOWNLOAD_STATE, progress.line),
            Some(serde_json::json!({
                "image": progress.image,
                "progress": progress.line,
            })),
        ),
        None => observer.state_update(run_id, DOWNLOAD_STATE, None),
    }
}

fn joined_references(images: &[RequiredImage]) -> String {
    images
        .iter()
        .map(|i| i.reference.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
