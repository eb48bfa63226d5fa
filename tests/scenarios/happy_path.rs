//! Test: Happy path - images pulled, pipeline executed, run completed

use crate::helpers::*;
use run_orchestrator::core::{RunStatus, RunType};
use run_orchestrator::orchestration::ObserverMessage;

/// Duplicate image references are pulled once, the run walks every state and
/// the observer sees download progress, then engine updates, then one record
#[tokio::test]
async fn test_run_completes_with_deduplicated_images() {
    let log = call_log();
    let engine = MockEngine::new(
        EngineScript::Succeed {
            updates: vec!["Running step s0", "Running step s1"],
            results: serde_json::json!({ "sum": 3 }),
        },
        log.clone(),
    );
    let mut h = harness(MockImageService::new(), engine, log.clone());

    let ticket = h.start("run-1", pipeline(&["imgA", "imgB", "imgA"])).await;
    let run = finish(ticket).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.results, Some(serde_json::json!({ "sum": 3 })));
    assert!(run.ended_at.is_some());
    assert!(run.error.is_none());

    assert_eq!(h.images.requested(), vec!["imgA", "imgB"]);
    assert_eq!(h.images.prune_count(), 1);

    let messages = h.drain_events();
    match &messages[0] {
        ObserverMessage::SaveLocalRun { run } => {
            assert_eq!(run.id, "run-1");
            assert_eq!(run.status, RunStatus::AcquiringImages);
        }
        other => panic!("expected save-local-run first, got {:?}", other),
    }

    let last_download = messages.iter().rposition(is_download_update).unwrap();
    let first_engine = messages.iter().position(is_engine_update).unwrap();
    let completed = messages
        .iter()
        .position(|m| matches!(m, ObserverMessage::RunCompleted { .. }))
        .unwrap();
    assert!(last_download < first_engine);
    assert!(first_engine < completed);

    let engine_updates: Vec<String> = messages
        .iter()
        .filter_map(|m| match m {
            ObserverMessage::StateUpdate(u) if is_engine_update(m) => Some(u.controller_state.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(engine_updates, vec!["Running step s0", "Running step s1"]);

    let terminal = terminal_messages(&messages);
    assert_eq!(terminal.len(), 1);
    match terminal[0] {
        ObserverMessage::RunCompleted { run_id, results, .. } => {
            assert_eq!(run_id, "run-1");
            assert_eq!(results, &serde_json::json!({ "sum": 3 }));
        }
        other => panic!("unexpected terminal record {:?}", other),
    }

    assert!(messages.iter().all(|m| m.run_id() == "run-1"));
}

#[tokio::test]
async fn test_cleanup_runs_once_on_completion() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let run = finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(h.engine.unlinks(), vec!["run-1"]);
    assert!(position(&log, "cleanup:run-1").unwrap() < position(&log, "notify:Pipeline finished").unwrap());
    assert!(!h.session.registry().contains("run-1").await);
}

#[tokio::test]
async fn test_milestone_notifications() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    finish(h.start("run-1", pipeline(&["imgA"])).await).await;

    assert_eq!(h.notifier.titles(), vec!["Pipeline started", "Pipeline finished"]);
}

/// Remote runs complete without a local completion record
#[tokio::test]
async fn test_remote_run_completion_is_not_reported() {
    let log = call_log();
    let mut h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let mut run = local_run("remote-1");
    run.run_type = RunType::Remote;
    let run = finish(h.start_run(run, pipeline(&["imgA"])).await).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(h.engine.unlinks(), vec!["remote-1"]);

    let messages = h.drain_events();
    assert!(terminal_messages(&messages).is_empty());
    assert!(!h.notifier.titles().contains(&"Pipeline finished".to_string()));
}

#[tokio::test]
async fn test_data_mappings_reach_the_engine_unchanged() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let mut mappings = run_orchestrator::core::DataMappings::new();
    mappings.insert("covariates".to_string(), serde_json::json!(["a.csv"]));
    let ticket = h
        .session
        .start_run(
            "consortium-9",
            std::sync::Arc::new(pipeline(&["imgA"])),
            mappings.clone(),
            local_run("run-1"),
        )
        .await
        .unwrap();
    let run = finish(ticket).await;

    assert_eq!(run.consortium_id, "consortium-9");
    assert_eq!(run.data_mappings, mappings);
    assert_eq!(h.engine.starts(), vec!["run-1"]);
}
