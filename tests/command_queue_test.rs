//! Command queue lifecycle as seen by the executor agent.

mod helpers;

use chrono::{Duration, Utc};

use autoheal::adapters::sqlite::SqliteCommandQueue;
use autoheal::domain::errors::DomainError;
use autoheal::domain::models::{ActionType, Command, CommandStatus, RemediationAction};
use autoheal::domain::ports::{CommandFilter, CommandQueue, EnqueueOutcome};
use autoheal::services::{RetryPolicy, RetryScheduler};
use helpers::database::{setup_test_db, teardown_test_db};

fn restart(cluster: &str, key: &str) -> Command {
    let action = RemediationAction::new(ActionType::RestartPod)
        .with_param("namespace", "prod")
        .with_param("pod_name", "api-7d8f-abc");
    Command::new(cluster, &action, 3, key)
}

#[tokio::test]
async fn test_ack_completes_command() {
    let pool = setup_test_db().await;
    let queue = SqliteCommandQueue::new(pool.clone());
    let command = restart("c1", "r1:restart_pod");
    assert!(matches!(queue.enqueue(&command).await.unwrap(), EnqueueOutcome::Created(_)));

    let leased = queue.lease("c1", 5, Duration::seconds(30)).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert!(leased[0].lease_expires_at.is_some());

    let done = queue.ack(command.id, serde_json::json!({ "restarted": true })).await.unwrap();
    assert_eq!(done.status, CommandStatus::Completed);
    assert_eq!(done.result, Some(serde_json::json!({ "restarted": true })));
    assert!(done.is_terminal());

    // A late nack cannot reopen a completed command.
    let err = queue.nack(command.id, "too late").await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_lease_is_scoped_to_cluster() {
    let pool = setup_test_db().await;
    let queue = SqliteCommandQueue::new(pool.clone());
    queue.enqueue(&restart("c1", "a:restart_pod")).await.unwrap();
    queue.enqueue(&restart("c2", "b:restart_pod")).await.unwrap();

    let leased = queue.lease("c1", 10, Duration::seconds(30)).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].cluster_id, "c1");
    assert!(queue.lease("c1", 10, Duration::seconds(30)).await.unwrap().is_empty());

    let pending = queue
        .list(CommandFilter { status: Some(CommandStatus::Pending), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].cluster_id, "c2");

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_abandoned_lease_is_retried_with_backoff() {
    let pool = setup_test_db().await;
    let queue = std::sync::Arc::new(SqliteCommandQueue::new(pool.clone()));
    let command = restart("c1", "r2:restart_pod");
    queue.enqueue(&command).await.unwrap();
    queue.lease("c1", 1, Duration::seconds(5)).await.unwrap();

    let scheduler = RetryScheduler::new(
        queue.clone(),
        RetryPolicy::default(),
        10,
        std::time::Duration::from_secs(5),
    );

    // Still within the lease: nothing to do.
    let report = scheduler.run_once().await.unwrap();
    assert_eq!(report.rearmed, 0);

    let later = Utc::now() + Duration::seconds(60);
    let report = scheduler.run_at(later).await.unwrap();
    assert_eq!(report.rearmed, 1);

    let rearmed = queue.get(command.id).await.unwrap().unwrap();
    assert_eq!(rearmed.status, CommandStatus::Pending);
    assert_eq!(rearmed.retry_count, 1);
    assert_eq!(rearmed.lease_expires_at, None);
    let next = rearmed.next_retry_at.expect("re-armed commands carry a retry time");
    assert!(next >= later + Duration::seconds(20));

    // Not leasable until the backoff elapses.
    assert!(queue.lease("c1", 1, Duration::seconds(5)).await.unwrap().is_empty());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_retry_times_strictly_increase() {
    let pool = setup_test_db().await;
    let queue = std::sync::Arc::new(SqliteCommandQueue::new(pool.clone()));
    let command = restart("c1", "r3:restart_pod");
    queue.enqueue(&command).await.unwrap();
    let scheduler = RetryScheduler::new(
        queue.clone(),
        RetryPolicy { max_retries: 3, initial_backoff_ms: 0, max_backoff_ms: 0 },
        10,
        std::time::Duration::from_secs(5),
    );

    // With zero backoff the retry times track the pass times, which only move forward.
    let mut previous = None;
    for _ in 0..3 {
        queue.lease("c1", 1, Duration::seconds(30)).await.unwrap();
        queue.nack(command.id, "boom").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        scheduler.run_once().await.unwrap();

        let next = queue.get(command.id).await.unwrap().unwrap().next_retry_at.unwrap();
        if let Some(prev) = previous {
            assert!(next > prev);
        }
        previous = Some(next);
    }

    teardown_test_db(pool).await;
}
