//! Test: Stop requests and explicit cleanup

use crate::helpers::*;
use run_orchestrator::core::{OrchestratorError, RunStatus};
use run_orchestrator::orchestration::{CleanupOutcome, ObserverMessage};
use std::time::Duration;

#[tokio::test]
async fn test_stop_during_execution() {
    let log = call_log();
    let engine = MockEngine::new(EngineScript::HangUntilStopped, log.clone());
    let mut h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;
    h.engine.wait_until_held("run-1").await;

    h.session.stop_run("p1", "run-1").await.unwrap();
    let run = finish(ticket).await;

    assert_eq!(run.status, RunStatus::Stopped);
    assert!(run.ended_at.is_some());
    assert_eq!(h.engine.stops(), vec![("p1".to_string(), "run-1".to_string())]);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
    assert!(!h.session.registry().contains("run-1").await);

    let messages = h.drain_events();
    assert!(matches!(
        terminal_messages(&messages).as_slice(),
        [ObserverMessage::RunStopped { .. }]
    ));
    assert!(h.notifier.titles().contains(&"Pipeline stopped".to_string()));
}

/// Stopping while images download abandons the pulls and never starts the engine
#[tokio::test]
async fn test_stop_during_acquisition() {
    let log = call_log();
    let images = MockImageService::new().with_script(
        "imgA",
        PullScript::Slow(Duration::from_secs(30), vec!["Pull complete"]),
    );
    let h = harness(images, MockEngine::succeeding(log.clone()), log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;
    wait_for_status(&ticket, RunStatus::AcquiringImages).await;

    h.session.stop_run("p1", "run-1").await.unwrap();
    let run = finish(ticket).await;

    assert_eq!(run.status, RunStatus::Stopped);
    assert!(h.engine.starts().is_empty());
    assert_eq!(h.engine.stops().len(), 1);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
    assert_eq!(h.images.prune_count(), 0);
}

#[tokio::test]
async fn test_stop_unknown_run_is_not_found() {
    let log = call_log();
    let engine = MockEngine::new(EngineScript::HangUntilStopped, log.clone());
    let mut h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;
    h.engine.wait_until_held("run-1").await;

    let err = h.session.stop_run("p1", "missing").await.unwrap_err();
    assert_eq!(err, OrchestratorError::NotFound("missing".to_string()));

    // Nothing changed for the live run
    assert_eq!(ticket.status(), RunStatus::Executing);
    assert!(h.engine.stops().is_empty());
    assert!(h.engine.unlinks().is_empty());
    assert!(terminal_messages(&h.drain_events()).is_empty());

    h.session.stop_run("p1", "run-1").await.unwrap();
    finish(ticket).await;
}

#[tokio::test]
async fn test_stop_after_completion_is_not_found() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA"])).await).await;
    assert_eq!(run.status, RunStatus::Completed);

    assert!(matches!(
        h.session.stop_run("p1", "run-1").await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(h.engine.stops().is_empty());
}

#[tokio::test]
async fn test_cleanup_unknown_run_is_not_found() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    assert!(matches!(
        h.session.cleanup_run("missing").await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(h.engine.unlinks().is_empty());
}

/// An explicit cleanup followed by the terminal cleanup releases files once
#[tokio::test]
async fn test_explicit_cleanup_is_idempotent_with_terminal_cleanup() {
    let log = call_log();
    let engine = MockEngine::new(EngineScript::HangUntilStopped, log.clone());
    let h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;
    h.engine.wait_until_held("run-1").await;

    assert_eq!(h.session.cleanup_run("run-1").await.unwrap(), CleanupOutcome::Released);
    assert_eq!(
        h.session.cleanup_run("run-1").await.unwrap(),
        CleanupOutcome::AlreadyReleased
    );

    h.session.stop_run("p1", "run-1").await.unwrap();
    let run = finish(ticket).await;

    assert_eq!(run.status, RunStatus::Stopped);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
}

/// Late engine output after a stop never changes the terminal state
#[tokio::test]
async fn test_terminal_state_is_final() {
    let log = call_log();
    let engine = MockEngine::new(EngineScript::HangUntilStopped, log.clone());
    let h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;
    h.engine.wait_until_held("run-1").await;
    let mut status = ticket.handle.subscribe();

    h.session.stop_run("p1", "run-1").await.unwrap();
    let run = finish(ticket).await;

    assert_eq!(run.status, RunStatus::Stopped);
    assert_eq!(*status.borrow_and_update(), RunStatus::Stopped);
    assert!(run.results.is_none());
    assert!(run.error.is_none());
}

#[tokio::test]
async fn test_duplicate_run_id_is_rejected_while_live() {
    let log = call_log();
    let engine = MockEngine::new(EngineScript::HangUntilStopped, log.clone());
    let h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;

    let duplicate = h
        .session
        .start_run(
            "consortium-1",
            std::sync::Arc::new(pipeline(&["imgB"])),
            Default::default(),
            local_run("run-1"),
        )
        .await;
    assert!(matches!(duplicate, Err(OrchestratorError::AlreadyRunning(_))));

    h.engine.wait_until_held("run-1").await;
    h.session.stop_run("p1", "run-1").await.unwrap();
    finish(ticket).await;
    assert_eq!(h.engine.starts(), vec!["run-1"]);
}

/// A finished run's id can be reused and the new run's files are released too
#[tokio::test]
async fn test_reused_run_id_is_cleaned_up_again() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let first = finish(h.start("run-1", pipeline(&["imgA"])).await).await;
    let second = finish(h.start("run-1", pipeline(&["imgB"])).await).await;

    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(h.engine.unlinks(), vec!["run-1", "run-1"]);
}
