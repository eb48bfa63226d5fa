//! Test: Execution failures and cleanup/notification faults

use crate::helpers::*;
use run_orchestrator::core::{ErrorKind, RunStatus};
use run_orchestrator::engine::ExecutionFailure;
use run_orchestrator::orchestration::ObserverMessage;

/// An engine rejection carries its input context to the observer, and the
/// staged files are released before the error notification fires
#[tokio::test]
async fn test_rejection_preserves_input_context() {
    let log = call_log();
    let engine = MockEngine::new(
        EngineScript::Fail {
            updates: vec!["Running step s0"],
            failure: ExecutionFailure::new("boom").with_input(serde_json::json!({ "x": 1 })),
        },
        log.clone(),
    );
    let mut h = harness(MockImageService::new(), engine, log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    assert_eq!(run.status, RunStatus::Errored);

    let messages = h.drain_events();
    let terminal = terminal_messages(&messages);
    assert_eq!(terminal.len(), 1);
    match terminal[0] {
        ObserverMessage::RunErrored { run_id, error, .. } => {
            assert_eq!(run_id, "run-1");
            assert_eq!(error.kind, ErrorKind::Execution);
            assert_eq!(error.message, "boom");
            assert_eq!(error.input, Some(serde_json::json!({ "x": 1 })));
        }
        other => panic!("unexpected terminal record {:?}", other),
    }

    let cleanup = position(&log, "cleanup:run-1").unwrap();
    let notify = position(&log, "notify:Pipeline error").unwrap();
    assert!(cleanup < notify);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
}

#[tokio::test]
async fn test_engine_refusing_to_start_errors_the_run() {
    let log = call_log();
    let engine = MockEngine::new(
        EngineScript::RejectStart(ExecutionFailure::new("no capacity")),
        log.clone(),
    );
    let h = harness(MockImageService::new(), engine, log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    assert_eq!(run.status, RunStatus::Errored);
    assert_eq!(run.error.unwrap().message, "no capacity");
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
    assert!(!h.notifier.titles().contains(&"Pipeline started".to_string()));
}

/// A failing notification sink never changes the outcome or skips cleanup
#[tokio::test]
async fn test_notifier_failure_does_not_affect_run() {
    let log = call_log();
    let h = harness_with(
        MockImageService::new(),
        MockEngine::succeeding(log.clone()),
        RecordingNotifier::failing(log.clone()),
        log.clone(),
    );

    let run = finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
    assert_eq!(h.notifier.titles(), vec!["Pipeline started", "Pipeline finished"]);
}

/// A failed release is reported but the run keeps its own terminal status
#[tokio::test]
async fn test_cleanup_failure_is_non_fatal() {
    let log = call_log();
    let engine = MockEngine::succeeding(log.clone()).with_failing_unlink();
    let mut h = harness(MockImageService::new(), engine, log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(h.notifier.titles().contains(&"Cleanup failed".to_string()));
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);

    let messages = h.drain_events();
    assert!(matches!(
        terminal_messages(&messages).as_slice(),
        [ObserverMessage::RunCompleted { .. }]
    ));
}

#[tokio::test]
async fn test_dropped_result_is_an_execution_error() {
    let log = call_log();
    let engine = MockEngine::new(EngineScript::HangUntilStopped, log.clone());
    let h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA"])).await;
    h.engine.wait_until_held("run-1").await;

    // Engine drops the run's handles without resolving it
    h.engine.drop_held("run-1");
    let run = finish(ticket).await;

    assert_eq!(run.status, RunStatus::Errored);
    assert_eq!(run.error.unwrap().kind, ErrorKind::Execution);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
}
