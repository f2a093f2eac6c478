//! Daemon scheduling against a real (in-memory) store.

mod helpers;

use std::time::Duration;

use autoheal::domain::models::SeverityLevel;
use autoheal::domain::ports::{CommandFilter, CommandQueue};
use autoheal::services::{AutoHealDaemon, DaemonConfig, DaemonEvent, StopReason};
use helpers::{anomaly, enabled_settings, engine, store, store_settings, CLUSTER};

#[tokio::test]
async fn test_daemon_dispatches_and_stops_on_request() {
    let ctx = engine().await;
    store_settings(&ctx, enabled_settings(true, false, SeverityLevel::Low)).await;
    store(&ctx, &anomaly("crash_loop_backoff", SeverityLevel::High, &["prod/api-7d8f-abc"])).await;

    let daemon = AutoHealDaemon::new(
        ctx.reconciler().unwrap(),
        ctx.retry_scheduler(),
        DaemonConfig::with_interval(Duration::from_millis(50)),
    );
    let handle = daemon.handle();
    let mut events = daemon.run();

    let dispatched = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = events.recv().await {
            if let DaemonEvent::CycleCompleted { cluster_id, dispatched, .. } = event {
                if cluster_id == CLUSTER && dispatched > 0 {
                    return dispatched;
                }
            }
        }
        0
    })
    .await
    .expect("daemon should reconcile the cluster");
    assert_eq!(dispatched, 1);

    handle.stop();
    let reason = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Some(DaemonEvent::Stopped { reason }) => return Some(reason),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .expect("daemon should stop");
    assert_eq!(reason, Some(StopReason::Requested));

    let status = handle.status().await;
    assert!(!status.running);
    assert!(status.retry_passes >= 1);
    assert_eq!(status.commands_dispatched, 1);
    assert_eq!(ctx.queue.list(CommandFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_once_skips_clusters_without_work() {
    let ctx = engine().await;
    let daemon = AutoHealDaemon::new(ctx.reconciler().unwrap(), ctx.retry_scheduler(), DaemonConfig::default());

    let (reports, retry) = daemon.run_once().await.unwrap();
    assert!(reports.is_empty());
    assert_eq!(retry.examined, 0);
}
