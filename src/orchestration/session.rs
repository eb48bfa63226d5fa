//! Session-scoped orchestration context
//!
//! A `Session` is created on login and owns everything a logged-in user's
//! runs share: the run registry, the image service handle, the pipeline
//! engine, the notification sink and the observer channel. Logging out
//! stops every live run and drops the lot.

use crate::{
    core::{DataMappings, OrchestratorConfig, OrchestratorError, PipelineDefinition, Run},
    engine::PipelineEngine,
    images::{ImageAcquisition, ImageInfo, ImageService, ServiceStatus},
    notify::{NoopNotifier, Notifier},
    orchestration::{
        cleanup::{CleanupGuarantor, CleanupOutcome},
        events::{Observer, ObserverMessage},
        machine::{RunServices, RunStateMachine, RunTicket},
        registry::RunRegistry,
    },
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Orchestration context for one logged-in user
pub struct Session {
    user: String,
    config: OrchestratorConfig,
    images: Arc<dyn ImageService>,
    services: Arc<RunServices>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ObserverMessage>>>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        user: impl Into<String>,
        config: OrchestratorConfig,
        images: Arc<dyn ImageService>,
        engine: Arc<dyn PipelineEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let notifier: Arc<dyn Notifier> = if config.notifications {
            notifier
        } else {
            Arc::new(NoopNotifier)
        };
        let (observer, events) = Observer::channel();

        let services = Arc::new(RunServices {
            acquisition: ImageAcquisition::new(images.clone(), config.progress_interval())
                .with_prune(config.prune_after_pull),
            cleanup: Arc::new(CleanupGuarantor::new(engine.clone(), notifier.clone())),
            engine,
            notifier,
            observer,
            registry: Arc::new(RunRegistry::new()),
        });

        Self {
            user: user.into(),
            config,
            images,
            services,
            events: Mutex::new(Some(events)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.services.registry
    }

    /// Take the observer stream; only the first caller gets it
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ObserverMessage>> {
        self.events.lock().ok().and_then(|mut events| events.take())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), OrchestratorError> {
        if self.is_closed() {
            Err(OrchestratorError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Start a run of `pipeline` for `consortium_id`
    ///
    /// Fails with `AlreadyRunning` if a run with the same id is live.
    pub async fn start_run(
        &self,
        consortium_id: &str,
        pipeline: Arc<PipelineDefinition>,
        data_mappings: DataMappings,
        mut run: Run,
    ) -> Result<RunTicket, OrchestratorError> {
        self.ensure_open()?;

        run.consortium_id = consortium_id.to_string();
        run.pipeline = pipeline;
        run.data_mappings = data_mappings;

        RunStateMachine::spawn(self.services.clone(), run).await
    }

    /// Stop a live run and wait until it reports `Stopped`
    pub async fn stop_run(&self, pipeline_id: &str, run_id: &str) -> Result<(), OrchestratorError> {
        let handle = self.services.registry.lookup(run_id).await?;
        handle.request_stop(pipeline_id).await
    }

    /// Release a live run's staged files now
    pub async fn cleanup_run(&self, run_id: &str) -> Result<CleanupOutcome, OrchestratorError> {
        self.services.registry.lookup(run_id).await?;
        Ok(self.services.cleanup.cleanup(run_id).await)
    }

    pub async fn image_status(&self) -> Result<ServiceStatus, OrchestratorError> {
        Ok(self.images.get_status().await?)
    }

    pub async fn list_images(&self) -> Result<Vec<ImageInfo>, OrchestratorError> {
        Ok(self.images.get_images().await?)
    }

    pub async fn remove_image(&self, image_id: &str) -> Result<(), OrchestratorError> {
        self.ensure_open()?;
        Ok(self.images.remove_image(image_id).await?)
    }

    pub async fn prune_images(&self) -> Result<(), OrchestratorError> {
        self.ensure_open()?;
        Ok(self.images.prune_images().await?)
    }

    /// Close the session and stop every live run
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let handles = self.services.registry.drain().await;
        info!(user = %self.user, runs = handles.len(), "Shutting down session");

        let mut stops = JoinSet::new();
        for handle in handles {
            stops.spawn(async move {
                let result = handle.request_stop(handle.pipeline_id()).await;
                (handle.run_id().to_string(), result)
            });
        }

        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((run_id, Ok(()))) => debug!(run_id, "Run stopped on logout"),
                Ok((run_id, Err(e))) => debug!(run_id, "Run already finished: {}", e),
                Err(e) => warn!("Stop task failed: {}", e),
            }
        }

        self.services.cleanup.clear().await;
    }
}

/// Collaborators a session is built from
#[derive(Clone)]
pub struct SessionDependencies {
    pub config: OrchestratorConfig,
    pub images: Arc<dyn ImageService>,
    pub engine: Arc<dyn PipelineEngine>,
    pub notifier: Arc<dyn Notifier>,
}

/// Creates a session on login and tears it down on logout
pub struct SessionManager {
    deps: SessionDependencies,
    current: tokio::sync::Mutex<Option<Arc<Session>>>,
}

impl SessionManager {
    pub fn new(deps: SessionDependencies) -> Self {
        Self {
            deps,
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Return the live session, creating it on first login
    ///
    /// Logging in again while a session exists returns that session.
    pub async fn login(&self, user: &str) -> Arc<Session> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            if session.user() != user {
                warn!(active = %session.user(), requested = user, "Session already active for another user");
            }
            return session.clone();
        }

        info!(user, "Creating session");
        let session = Arc::new(Session::new(
            user,
            self.deps.config.clone(),
            self.deps.images.clone(),
            self.deps.engine.clone(),
            self.deps.notifier.clone(),
        ));
        *current = Some(session.clone());
        session
    }

    /// Tear down the live session, if any
    pub async fn logout(&self) {
        let session = self.current.lock().await.take();
        if let Some(session) = session {
            session.shutdown().await;
            info!(user = %session.user(), "Logged out");
        }
    }

    pub async fn current(&self) -> Result<Arc<Session>, OrchestratorError> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or(OrchestratorError::SessionClosed)
    }
}
