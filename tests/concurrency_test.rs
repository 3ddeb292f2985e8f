//! Resolution race tests
//!
//! Completion, abort and the expiry sweep all claim a session through the
//! registry's atomic take. These tests race them against each other with
//! backend latency injected and check that exactly one caller wins and only
//! the winner reaches the backend.

mod common;

use chrono::Utc;
use common::{init_request, memory_orchestrator, parts, MIB};
use std::time::Duration;
use upload_orchestrator::gateway::GatewayCall;
use upload_orchestrator::AbortOutcome;

fn resolution_calls(calls: &[GatewayCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, GatewayCall::Complete { .. } | GatewayCall::Abort { .. }))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_complete_and_abort_race_has_single_winner() {
    for _ in 0..20 {
        let (gateway, orch) = memory_orchestrator();
        let init = orch.init_upload(init_request("race.bin", MIB)).await.unwrap();
        gateway.set_latency(Duration::from_millis(5));

        let (o1, o2) = (orch.clone(), orch.clone());
        let (h1, h2) = (init.handle.clone(), init.handle.clone());
        let complete = tokio::spawn(async move { o1.complete_upload(&h1, parts(1)).await });
        let abort = tokio::spawn(async move { o2.abort_upload(&h2).await });

        let completed = complete.await.unwrap();
        let aborted = abort.await.unwrap();

        match (&completed, aborted) {
            (Ok(_), AbortOutcome::Unknown) => {}
            (Err(e), AbortOutcome::Aborted) => assert!(e.is_unknown_upload(), "got {:?}", e),
            other => panic!("expected exactly one winner, got {:?}", other),
        }
        assert_eq!(resolution_calls(&gateway.calls()), 1);
        assert_eq!(orch.pending_count(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_completions_succeed_once() {
    let (gateway, orch) = memory_orchestrator();
    let init = orch
        .init_upload(init_request("dup.bin", 120 * MIB))
        .await
        .unwrap();
    gateway.set_latency(Duration::from_millis(5));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let orch = orch.clone();
            let handle = init.handle.clone();
            tokio::spawn(async move { orch.complete_upload(&handle, parts(3)).await })
        })
        .collect();

    let mut successes = 0;
    let mut unknown = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) if e.is_unknown_upload() => unknown += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(unknown, 7);
    assert_eq!(gateway.completed().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_complete_racing_expiry_sweep() {
    for _ in 0..20 {
        let (gateway, orch) = memory_orchestrator();
        let init = orch.init_upload(init_request("sweep.bin", MIB)).await.unwrap();
        gateway.set_latency(Duration::from_millis(5));

        let reclaimer = orch.reclaimer();
        let later = Utc::now() + chrono::Duration::hours(1);
        let o = orch.clone();
        let h = init.handle.clone();
        let complete = tokio::spawn(async move { o.complete_upload(&h, parts(1)).await });
        let report = reclaimer.sweep_expired_at(later).await;
        let completed = complete.await.unwrap();

        let swept = report.aborted + report.failed;
        match completed {
            Ok(_) => assert_eq!(swept, 0),
            Err(e) => {
                assert!(e.is_unknown_upload(), "got {:?}", e);
                assert_eq!(swept, 1);
            }
        }
        assert_eq!(resolution_calls(&gateway.calls()), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inits_get_distinct_handles() {
    let (gateway, orch) = memory_orchestrator();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.init_upload(init_request(&format!("many/{}.bin", i), MIB))
                    .await
                    .unwrap()
                    .handle
            })
        })
        .collect();

    let mut handles = std::collections::HashSet::new();
    for task in tasks {
        handles.insert(task.await.unwrap());
    }
    assert_eq!(handles.len(), 16);
    assert_eq!(orch.pending_count(), 16);
    assert_eq!(gateway.open_count(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_complete_racing_startup_sweep() {
    for _ in 0..20 {
        let (gateway, orch) = memory_orchestrator();
        let init = orch.init_upload(init_request("boot.bin", MIB)).await.unwrap();
        gateway.set_latency(Duration::from_millis(20));

        // A clock far enough ahead that every open session looks stale
        let reclaimer = orch.reclaimer();
        let later = Utc::now() + chrono::Duration::hours(1);
        let sweep = tokio::spawn(async move { reclaimer.startup_sweep_at(later).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let completed = orch.complete_upload(&init.handle, parts(1)).await;
        let report = sweep.await.unwrap().unwrap();

        assert!(completed.is_ok(), "got {:?}", completed);
        assert_eq!(report.aborted + report.failed, 0);
        assert!(gateway.aborted().is_empty());
        assert_eq!(resolution_calls(&gateway.calls()), 1);
    }
}

#[tokio::test]
async fn test_startup_sweep_still_reclaims_sessions_from_before_start() {
    let (gateway, orch) = memory_orchestrator();
    let left_behind = gateway.seed_session(
        "previous/run.bin",
        orch.started_at() - chrono::Duration::hours(1),
    );
    let init = orch.init_upload(init_request("current.bin", MIB)).await.unwrap();

    let later = Utc::now() + chrono::Duration::hours(1);
    let report = orch.reclaimer().startup_sweep_at(later).await.unwrap();

    assert_eq!(report.aborted, 1);
    assert_eq!(gateway.aborted(), vec![left_behind]);
    assert!(orch.registry().get(&init.handle).is_some());
}
