//! Test: Concurrent runs progress independently

use crate::helpers::*;
use run_orchestrator::core::RunStatus;
use std::time::Duration;

/// Run B starts and finishes while run A is still acquiring images
#[tokio::test]
async fn test_disjoint_runs_do_not_block_each_other() {
    let log = call_log();
    let images = MockImageService::new().with_script(
        "slow-img",
        PullScript::Slow(Duration::from_millis(500), vec!["Pull complete"]),
    );
    let mut h = harness(images, MockEngine::succeeding(log.clone()), log.clone());

    let a = h.start("run-a", pipeline(&["slow-img"])).await;
    wait_for_status(&a, RunStatus::AcquiringImages).await;

    let b = h.start("run-b", pipeline(&["fast-img"])).await;
    let run_b = finish(b).await;

    assert_eq!(run_b.status, RunStatus::Completed);
    assert_eq!(a.status(), RunStatus::AcquiringImages);
    assert!(h.session.registry().contains("run-a").await);

    let run_a = finish(a).await;
    assert_eq!(run_a.status, RunStatus::Completed);

    let mut unlinks = h.engine.unlinks();
    unlinks.sort();
    assert_eq!(unlinks, vec!["run-a", "run-b"]);
    assert_eq!(h.engine.starts(), vec!["run-b", "run-a"]);

    // Each run's observer records are tagged with its own id
    let messages = h.drain_events();
    let completed: Vec<&str> = messages
        .iter()
        .filter(|m| m.is_terminal())
        .map(|m| m.run_id())
        .collect();
    assert_eq!(completed, vec!["run-b", "run-a"]);
}

/// Concurrent runs needing the same image each issue their own pull
#[tokio::test]
async fn test_shared_image_is_pulled_per_run() {
    let log = call_log();
    let h = harness(MockImageService::new(), MockEngine::succeeding(log.clone()), log.clone());

    let a = h.start("run-a", pipeline(&["imgA"])).await;
    let b = h.start("run-b", pipeline(&["imgA"])).await;
    let (run_a, run_b) = tokio::join!(finish(a), finish(b));

    assert_eq!(run_a.status, RunStatus::Completed);
    assert_eq!(run_b.status, RunStatus::Completed);
    assert_eq!(h.images.requested(), vec!["imgA", "imgA"]);
    assert_eq!(h.images.prune_count(), 2);
    assert!(h.session.registry().is_empty().await);
}
