//! Test: Image acquisition failures

use crate::helpers::*;
use run_orchestrator::core::{ErrorKind, RunStatus};
use run_orchestrator::orchestration::ObserverMessage;
use std::time::Duration;

/// One stream errors while another is still pulling: the run errors with that
/// message, but only after the slow pull has settled
#[tokio::test]
async fn test_stream_error_waits_for_outstanding_pulls() {
    let log = call_log();
    let images = MockImageService::new()
        .with_script(
            "imgA",
            PullScript::Slow(Duration::from_millis(200), vec!["Downloading", "Pull complete"]),
        )
        .with_script("imgB", PullScript::FailAfter(vec!["Pulling fs layer"], "manifest unknown"));
    let mut h = harness(images, MockEngine::succeeding(log.clone()), log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA", "imgB"])).await).await;

    assert_eq!(run.status, RunStatus::Errored);
    let error = run.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ImageAcquisition);
    assert!(error.message.contains("manifest unknown"));

    // imgA settled before the coordinator gave up
    let finished = h.images.finished();
    assert!(finished.contains(&"imgA".to_string()));
    assert!(finished.contains(&"imgB".to_string()));

    assert!(h.engine.starts().is_empty());
    assert_eq!(h.images.prune_count(), 0);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);

    let messages = h.drain_events();
    let terminal = terminal_messages(&messages);
    assert_eq!(terminal.len(), 1);
    match terminal[0] {
        ObserverMessage::RunErrored { error, .. } => {
            assert!(error.message.contains("manifest unknown"));
        }
        other => panic!("unexpected terminal record {:?}", other),
    }
}

#[tokio::test]
async fn test_pull_that_never_starts_errors_the_run() {
    let log = call_log();
    let images = MockImageService::new().with_script("imgA", PullScript::NotStarted("daemon unreachable"));
    let h = harness(images, MockEngine::succeeding(log.clone()), log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA", "imgB"])).await).await;

    assert_eq!(run.status, RunStatus::Errored);
    assert!(run.error.unwrap().message.contains("daemon unreachable"));
    // imgB was still pulled to completion
    assert_eq!(h.images.finished(), vec!["imgB"]);
    assert!(h.engine.starts().is_empty());
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
    assert_eq!(h.notifier.titles(), vec!["Pipeline error"]);
}

/// A step without an image fails before any pull is issued
#[tokio::test]
async fn test_missing_image_reference_is_a_validation_error() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let mut definition = pipeline(&["imgA"]);
    definition.steps[0].computation.image = None;
    let run = finish(h.start("run-1", definition).await).await;

    assert_eq!(run.status, RunStatus::Errored);
    assert_eq!(run.error.unwrap().kind, ErrorKind::Validation);
    assert!(h.images.requested().is_empty());
    assert!(h.engine.starts().is_empty());
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
}

#[tokio::test]
async fn test_errored_run_cleans_up_before_notifying() {
    let log = call_log();
    let images = MockImageService::new().with_script("imgA", PullScript::FailAfter(vec![], "denied"));
    let h = harness(images, MockEngine::succeeding(log.clone()), log.clone());

    finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    let cleanup = position(&log, "cleanup:run-1").unwrap();
    let notify = position(&log, "notify:Pipeline error").unwrap();
    assert!(cleanup < notify);
}
