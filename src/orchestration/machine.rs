//! Run state machine - owns one run from submission to a terminal state

use crate::{
    core::{transition, Effect, ErrorKind, OrchestratorError, Run, RunEvent, RunFailure, RunStatus},
    engine::{PipelineEngine, PipelineUpdate, StartRequest, StartedPipeline},
    images::{resolve_images, ImageAcquisition},
    notify::{Notification, Notifier},
    orchestration::{
        cleanup::CleanupGuarantor,
        events::{Observer, ObserverMessage},
        registry::{Control, RunHandle, RunRegistry},
    },
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every run of a session
pub struct RunServices {
    pub acquisition: ImageAcquisition,
    pub engine: Arc<dyn PipelineEngine>,
    pub cleanup: Arc<CleanupGuarantor>,
    pub notifier: Arc<dyn Notifier>,
    pub observer: Observer,
    pub registry: Arc<RunRegistry>,
}

/// A started run: its registry handle and the task driving it
#[derive(Debug)]
pub struct RunTicket {
    pub handle: Arc<RunHandle>,
    task: JoinHandle<Run>,
}

impl RunTicket {
    pub fn run_id(&self) -> &str {
        self.handle.run_id()
    }

    pub fn status(&self) -> RunStatus {
        self.handle.status()
    }

    /// Wait for the run to reach a terminal state
    pub async fn wait(self) -> Result<Run, OrchestratorError> {
        self.task.await.map_err(|e| OrchestratorError::Execution {
            message: format!("run task failed: {}", e),
            input: None,
        })
    }
}

/// Pending stop request awaiting the `Stopped` transition
struct PendingStop {
    pipeline_id: String,
    ack: oneshot::Sender<Result<(), OrchestratorError>>,
}

/// Drives one run through its lifecycle
pub struct RunStateMachine {
    run: Run,
    services: Arc<RunServices>,
    status_tx: watch::Sender<RunStatus>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    pending_stop: Option<PendingStop>,
}

impl RunStateMachine {
    /// Register the run and start driving it on its own task
    ///
    /// Fails with `AlreadyRunning` if a machine for the run id exists.
    pub async fn spawn(services: Arc<RunServices>, mut run: Run) -> Result<RunTicket, OrchestratorError> {
        run.status = RunStatus::Created;
        let (status_tx, status_rx) = watch::channel(RunStatus::Created);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(RunHandle::new(
            run.id.clone(),
            run.pipeline_id().to_string(),
            status_rx,
            control_tx,
        ));

        services.registry.register(handle.clone()).await?;
        services.cleanup.rearm(&run.id).await;
        info!(run_id = %run.id, pipeline = %run.pipeline_id(), "Run registered");

        let machine = Self {
            run,
            services,
            status_tx,
            control_rx,
            pending_stop: None,
        };
        let task = tokio::spawn(machine.drive());

        Ok(RunTicket { handle, task })
    }

    async fn drive(mut self) -> Run {
        // A stop that arrived before the task started wins over Begin
        let mut next = match self.control_rx.try_recv() {
            Ok(control) => Some(self.accept_stop(control)),
            Err(_) => Some(RunEvent::Begin),
        };

        while let Some(event) = next.take() {
            next = self.step(event).await;
        }

        self.finish().await;
        self.run
    }

    /// Apply one event: transition, then perform the effects in order
    async fn step(&mut self, event: RunEvent) -> Option<RunEvent> {
        let t = match transition(self.run.status, &event) {
            Ok(t) => t,
            Err(e) => {
                debug!(run_id = %self.run.id, "Ignoring event: {}", e);
                return None;
            }
        };

        info!(run_id = %self.run.id, from = %t.from, to = %t.to, "Run transition");
        self.enter(t.to, event);

        let mut follow_up = None;
        for effect in t.effects {
            match effect {
                Effect::SaveLocalRun => self.services.observer.emit(ObserverMessage::SaveLocalRun {
                    run: self.run.clone(),
                }),
                Effect::AcquireImages => follow_up = Some(self.acquire_images().await),
                Effect::StartPipeline => follow_up = Some(self.execute().await),
                Effect::ForwardStop => self.forward_stop().await,
                Effect::Cleanup => {
                    self.services.cleanup.cleanup(&self.run.id).await;
                }
                Effect::EmitCompleted => self.emit_completed(),
                Effect::EmitErrored => self.emit_errored(),
                Effect::EmitStopped => self.emit_stopped(),
            }
        }
        follow_up
    }

    /// Record the new status and whatever the event carried
    fn enter(&mut self, status: RunStatus, event: RunEvent) {
        self.run.status = status;
        self.status_tx.send_replace(status);

        match event {
            RunEvent::ExecutionSucceeded { results } => self.run.results = Some(results),
            RunEvent::AcquisitionFailed(failure) | RunEvent::ExecutionFailed(failure) => {
                self.run.error = Some(failure)
            }
            _ => {}
        }

        if status.is_terminal() {
            self.run.ended_at = Some(Utc::now());
        }
    }

    fn accept_stop(&mut self, control: Control) -> RunEvent {
        match control {
            Control::Stop { pipeline_id, ack } => {
                info!(run_id = %self.run.id, "Stop requested");
                self.pending_stop = Some(PendingStop { pipeline_id, ack });
                RunEvent::StopRequested
            }
        }
    }

    async fn acquire_images(&mut self) -> RunEvent {
        let images = match resolve_images(&self.run.pipeline) {
            Ok(images) => images,
            Err(e) => {
                warn!(run_id = %self.run.id, "{}", e);
                return RunEvent::AcquisitionFailed(RunFailure::from(&e));
            }
        };

        // Dropping the acquisition on stop aborts its pull tasks together
        let outcome = tokio::select! {
            result = self.services.acquisition.acquire(&self.run.id, &images, &self.services.observer) => result,
            Some(control) = self.control_rx.recv() => return self.accept_stop(control),
        };

        match outcome {
            Ok(report) => {
                debug!(run_id = %self.run.id, pulled = report.pulled.len(), pruned = report.pruned, "Acquisition finished");
                RunEvent::ImagesAcquired
            }
            Err(e) => RunEvent::AcquisitionFailed(RunFailure::from(&e)),
        }
    }

    async fn execute(&mut self) -> RunEvent {
        let request = StartRequest {
            consortium_id: self.run.consortium_id.clone(),
            pipeline: self.run.pipeline.clone(),
            files: self.run.data_mappings.clone(),
            run_id: self.run.id.clone(),
        };

        let started = tokio::select! {
            started = self.services.engine.start_pipeline(request) => started,
            Some(control) = self.control_rx.recv() => return self.accept_stop(control),
        };

        let StartedPipeline {
            mut updates,
            mut result,
        } = match started {
            Ok(started) => started,
            Err(failure) => {
                error!(run_id = %self.run.id, "Pipeline failed to start: {}", failure.message);
                return RunEvent::ExecutionFailed(failure.into());
            }
        };

        self.notify(Notification::started(&self.run.id, self.pipeline_name()));

        let mut updates_open = true;
        loop {
            tokio::select! {
                biased;
                Some(control) = self.control_rx.recv() => return self.accept_stop(control),
                update = updates.recv(), if updates_open => match update {
                    Some(update) => self.relay(update),
                    None => updates_open = false,
                },
                outcome = &mut result => {
                    while let Ok(update) = updates.try_recv() {
                        self.relay(update);
                    }
                    return match outcome {
                        Ok(Ok(results)) => RunEvent::ExecutionSucceeded {
                            results: results.results,
                        },
                        Ok(Err(failure)) => {
                            warn!(run_id = %self.run.id, "Pipeline execution failed: {}", failure.message);
                            RunEvent::ExecutionFailed(failure.into())
                        }
                        Err(_) => RunEvent::ExecutionFailed(RunFailure::new(
                            ErrorKind::Execution,
                            "pipeline engine dropped the run result",
                        )),
                    };
                }
            }
        }
    }

    fn relay(&self, update: PipelineUpdate) {
        self.services
            .observer
            .state_update(&self.run.id, update.controller_state, update.payload);
    }

    async fn forward_stop(&self) {
        let pipeline_id = self
            .pending_stop
            .as_ref()
            .map(|p| p.pipeline_id.as_str())
            .unwrap_or_else(|| self.run.pipeline_id());

        if let Err(e) = self.services.engine.request_stop(pipeline_id, &self.run.id).await {
            warn!(run_id = %self.run.id, "Engine stop request failed: {}", e);
        }
    }

    fn emit_completed(&self) {
        if !self.run.is_local() {
            debug!(run_id = %self.run.id, "Remote run completed, not reported locally");
            return;
        }
        self.services.observer.emit(ObserverMessage::RunCompleted {
            run_id: self.run.id.clone(),
            results: self.run.results.clone().unwrap_or(serde_json::Value::Null),
            end_date: self.end_date(),
        });
        self.notify(Notification::finished(&self.run.id, self.pipeline_name()));
    }

    fn emit_errored(&self) {
        let error = self
            .run
            .error
            .clone()
            .unwrap_or_else(|| RunFailure::new(ErrorKind::Execution, "unknown error"));
        let message = error.message.clone();
        self.services.observer.emit(ObserverMessage::RunErrored {
            run_id: self.run.id.clone(),
            error,
            end_date: self.end_date(),
        });
        self.notify(Notification::errored(&self.run.id, self.pipeline_name(), &message));
    }

    fn emit_stopped(&self) {
        self.services.observer.emit(ObserverMessage::RunStopped {
            run_id: self.run.id.clone(),
            end_date: self.end_date(),
        });
        self.notify(Notification::stopped(&self.run.id, self.pipeline_name()));
    }

    fn notify(&self, notification: Notification) {
        if let Err(e) = self.services.notifier.notify(notification) {
            warn!(run_id = %self.run.id, "{}", e);
        }
    }

    fn end_date(&self) -> chrono::DateTime<Utc> {
        self.run.ended_at.unwrap_or_else(Utc::now)
    }

    fn pipeline_name(&self) -> &str {
        if self.run.pipeline.name.is_empty() {
            &self.run.pipeline.id
        } else {
            &self.run.pipeline.name
        }
    }

    /// Deregister, then settle any stop requests still queued
    async fn finish(&mut self) {
        self.services.registry.remove(&self.run.id).await;

        if let Some(pending) = self.pending_stop.take() {
            let _ = pending.ack.send(Ok(()));
        }

        self.control_rx.close();
        while let Ok(Control::Stop { ack, .. }) = self.control_rx.try_recv() {
            let _ = ack.send(Err(OrchestratorError::NotFound(self.run.id.clone())));
        }

        info!(run_id = %self.run.id, status = %self.run.status, "Run finished");
    }
}
