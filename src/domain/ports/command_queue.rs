//! Queue port for the hand-off to the executor agent.
//!
//! The queue has at-least-once delivery with manual acknowledgement:
//! `enqueue` creates Pending commands, the agent `lease`s them (Executing)
//! and reports back with `ack` (Completed) or `nack` (Failed). `rearm` is the
//! dead-letter requeue used by the retry scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Command, CommandStatus};

/// Result of an idempotent enqueue.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new command was written.
    Created(Command),
    /// A command with the same idempotency key already existed.
    Existing(Command),
}

impl EnqueueOutcome {
    pub fn command(&self) -> &Command {
        match self {
            Self::Created(command) | Self::Existing(command) => command,
        }
    }

    pub fn into_command(self) -> Command {
        match self {
            Self::Created(command) | Self::Existing(command) => command,
        }
    }
}

/// Filter for listing commands.
#[derive(Debug, Default, Clone)]
pub struct CommandFilter {
    pub cluster_id: Option<String>,
    pub status: Option<CommandStatus>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// Insert a Pending command unless its idempotency key is already queued.
    async fn enqueue(&self, command: &Command) -> DomainResult<EnqueueOutcome>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>>;

    /// Move up to `limit` due Pending commands of a cluster to Executing,
    /// oldest first, holding them for `lease_for`.
    async fn lease(
        &self,
        cluster_id: &str,
        limit: u32,
        lease_for: Duration,
    ) -> DomainResult<Vec<Command>>;

    /// Executor success report: Executing -> Completed.
    async fn ack(&self, id: Uuid, result: serde_json::Value) -> DomainResult<Command>;

    /// Executor failure report: Executing -> Failed.
    async fn nack(&self, id: Uuid, error: &str) -> DomainResult<Command>;

    /// Failed or lease-expired commands that still have attempts left and are due at `now`.
    async fn list_retryable(&self, now: DateTime<Utc>, limit: u32) -> DomainResult<Vec<Command>>;

    /// Persist a re-armed command. The write only lands if the stored retry
    /// count still equals `observed_retry_count`, so two schedulers cannot
    /// both re-arm the same attempt. Returns whether the write landed.
    async fn rearm(&self, command: &Command, observed_retry_count: u32) -> DomainResult<bool>;

    /// Commands that ran out of attempts and were not yet reported, for one
    /// cluster or all of them.
    async fn list_exhausted_unreported(
        &self,
        cluster_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Command>>;

    async fn mark_exhausted_reported(&self, ids: &[Uuid], at: DateTime<Utc>) -> DomainResult<()>;

    async fn list(&self, filter: CommandFilter) -> DomainResult<Vec<Command>>;
}
