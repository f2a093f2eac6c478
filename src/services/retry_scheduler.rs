//! Retry scheduler: the dead-letter requeue policy of the command queue.
//!
//! Failed commands, and executions whose lease lapsed without an ack, are
//! moved back to Pending with an exponentially growing `next_retry_at` until
//! they run out of attempts. Exhausted commands are left Failed for the run
//! reporter to surface.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Command, RetryConfig};
use crate::domain::ports::CommandQueue;
use crate::services::bounded::bounded;

/// Exponential backoff: 10s → 20s → 40s → ... capped at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 300_000,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt`: `min(2^attempt * initial, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    pub fn next_retry_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.backoff(attempt)).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Summary of one retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPassReport {
    pub examined: usize,
    pub rearmed: usize,
    /// Commands another scheduler (or a late ack) changed under us.
    pub skipped: usize,
    /// Clusters holding exhausted commands not yet reported to an operator.
    pub exhausted_clusters: BTreeSet<String>,
}

pub struct RetryScheduler {
    queue: Arc<dyn CommandQueue>,
    policy: RetryPolicy,
    batch_size: u32,
    timeout: Duration,
}

impl RetryScheduler {
    pub fn new(queue: Arc<dyn CommandQueue>, policy: RetryPolicy, batch_size: u32, timeout: Duration) -> Self {
        Self {
            queue,
            policy,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run_once(&self) -> DomainResult<RetryPassReport> {
        self.run_at(Utc::now()).await
    }

    /// Re-arm every due command as of `now`.
    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> DomainResult<RetryPassReport> {
        let mut report = RetryPassReport::default();

        let due = bounded(self.timeout, "list_retryable", self.queue.list_retryable(now, self.batch_size)).await?;
        report.examined = due.len();

        for command in due {
            if self.rearm(command, now).await? {
                report.rearmed += 1;
            } else {
                report.skipped += 1;
            }
        }

        let exhausted = bounded(
            self.timeout,
            "list_exhausted_unreported",
            self.queue.list_exhausted_unreported(None, now),
        )
        .await?;
        report.exhausted_clusters = exhausted.into_iter().map(|c| c.cluster_id).collect();

        if report.examined > 0 || !report.exhausted_clusters.is_empty() {
            tracing::info!(
                examined = report.examined,
                rearmed = report.rearmed,
                skipped = report.skipped,
                exhausted_clusters = report.exhausted_clusters.len(),
                "retry pass complete"
            );
        }
        Ok(report)
    }

    async fn rearm(&self, mut command: Command, now: DateTime<Utc>) -> DomainResult<bool> {
        let observed = command.retry_count;
        let attempt = observed.saturating_add(1);
        let next_retry_at = self.policy.next_retry_at(now, attempt);

        if let Err(err) = command.rearm(now, next_retry_at) {
            tracing::debug!(command_id = %command.id, error = %err, "command no longer eligible for retry");
            return Ok(false);
        }

        let landed = bounded(self.timeout, "rearm_command", self.queue.rearm(&command, observed)).await?;
        if landed {
            tracing::info!(
                command_id = %command.id,
                cluster_id = %command.cluster_id,
                attempt,
                max_retries = command.max_retries,
                next_retry_at = %next_retry_at,
                "command re-armed"
            );
        }
        Ok(landed)
    }
}
