//! Test: Session login/logout and image inventory operations

use crate::helpers::*;
use run_orchestrator::core::{OrchestratorError, RunStatus};
use run_orchestrator::orchestration::{SessionDependencies, SessionManager};
use std::sync::Arc;

fn manager(engine: Arc<MockEngine>, log: CallLog) -> SessionManager {
    SessionManager::new(SessionDependencies {
        config: test_config(),
        images: Arc::new(MockImageService::new()),
        engine,
        notifier: Arc::new(RecordingNotifier::new(log)),
    })
}

#[tokio::test]
async fn test_login_twice_returns_same_session() {
    let log = call_log();
    let manager = manager(Arc::new(MockEngine::succeeding(log.clone())), log);

    assert!(matches!(manager.current().await, Err(OrchestratorError::SessionClosed)));

    let first = manager.login("alice").await;
    let second = manager.login("alice").await;
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.take_events().is_some());
    assert!(second.take_events().is_none());
}

/// Logging out stops every live run and closes the session
#[tokio::test]
async fn test_logout_stops_live_runs() {
    let log = call_log();
    let engine = Arc::new(MockEngine::new(EngineScript::HangUntilStopped, log.clone()));
    let manager = manager(engine.clone(), log);

    let session = manager.login("alice").await;
    let _events = session.take_events();

    let a = session
        .start_run("c1", Arc::new(pipeline(&["imgA"])), Default::default(), local_run("run-a"))
        .await
        .unwrap();
    let b = session
        .start_run("c1", Arc::new(pipeline(&["imgB"])), Default::default(), local_run("run-b"))
        .await
        .unwrap();
    engine.wait_until_held("run-a").await;
    engine.wait_until_held("run-b").await;

    manager.logout().await;

    assert_eq!(finish(a).await.status, RunStatus::Stopped);
    assert_eq!(finish(b).await.status, RunStatus::Stopped);

    let mut unlinks = engine.unlinks();
    unlinks.sort();
    assert_eq!(unlinks, vec!["run-a", "run-b"]);

    assert!(session.is_closed());
    assert!(matches!(manager.current().await, Err(OrchestratorError::SessionClosed)));
    assert!(matches!(
        session
            .start_run("c1", Arc::new(pipeline(&["imgA"])), Default::default(), local_run("run-c"))
            .await,
        Err(OrchestratorError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_login_after_logout_creates_fresh_session() {
    let log = call_log();
    let manager = manager(Arc::new(MockEngine::succeeding(log.clone())), log);

    let first = manager.login("alice").await;
    manager.logout().await;
    let second = manager.login("bob").await;

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.user(), "bob");
    assert!(!second.is_closed());
}

#[tokio::test]
async fn test_image_operations_forward_to_service() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log);

    assert!(h.session.image_status().await.unwrap().ready);
    assert!(h.session.list_images().await.unwrap().is_empty());
    h.session.remove_image("sha256:abc").await.unwrap();
    h.session.prune_images().await.unwrap();
    assert_eq!(h.images.prune_count(), 1);
}
