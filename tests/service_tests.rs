//! Tick loop scheduling tests.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use relmon_service::relmon::JobStatus;
use relmon_service::service::tick_loop;
use test_harness::{Harness, Op};

fn closes(harness: &Harness) -> usize {
    harness
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::Close))
        .count()
}

async fn wait_for_ticks(harness: &Harness, ticks: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while closes(harness) < ticks {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {ticks} ticks, saw {}", closes(harness)));
}

#[tokio::test]
async fn test_triggers_during_tick_coalesce() {
    let harness = Harness::new();
    harness
        .insert_job(|job| {
            job.status = JobStatus::Running;
            job.condor_id = 550;
        })
        .await;
    let (entered, release) = harness.remote.hold();

    let trigger = Arc::new(Notify::new());
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(tick_loop(
        harness.controller.clone(),
        trigger.clone(),
        Duration::from_secs(3600),
        shutdown.clone(),
    ));

    // The first tick starts right away and blocks on the remote
    entered.notified().await;
    for _ in 0..3 {
        trigger.notify_one();
    }
    release.notify_one();

    wait_for_ticks(&harness, 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(closes(&harness), 2);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_trigger_wakes_idle_loop() {
    let harness = Harness::new();
    let trigger = Arc::new(Notify::new());
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(tick_loop(
        harness.controller.clone(),
        trigger.clone(),
        Duration::from_secs(3600),
        shutdown.clone(),
    ));

    wait_for_ticks(&harness, 1).await;
    trigger.notify_one();
    wait_for_ticks(&harness, 2).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closes(&harness), 2);
}
