//! Command dispatch: audit entry, queued command, resolved sources.
//!
//! Each step is fallible on its own. The audit entry is written first so a
//! remediation attempt always leaves evidence. Sources are only resolved
//! after the command is durably queued.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActionLogEntry, ActionLogOutcome, ActionType, Command};
use crate::domain::ports::{ActionLogRepository, CommandQueue, EnqueueOutcome, ProblemRepository};
use crate::services::bounded::bounded;
use crate::services::deduplicator::PlannedAction;

/// Result of dispatching one planned action.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub record_id: Uuid,
    pub action_type: ActionType,
    pub target: String,
    pub action_log_id: Option<Uuid>,
    pub command: Option<Command>,
    /// True when the command already existed from an earlier cycle.
    pub reused: bool,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.command.is_some() && self.error.is_none()
    }
}

pub struct CommandDispatcher {
    queue: Arc<dyn CommandQueue>,
    action_logs: Arc<dyn ActionLogRepository>,
    problems: Arc<dyn ProblemRepository>,
    max_retries: u32,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        queue: Arc<dyn CommandQueue>,
        action_logs: Arc<dyn ActionLogRepository>,
        problems: Arc<dyn ProblemRepository>,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            action_logs,
            problems,
            max_retries,
            timeout,
        }
    }

    /// Dispatch one planned action.
    ///
    /// Write failures come back inside the outcome. Only timeouts are
    /// returned as errors, since they abort the whole cycle.
    #[instrument(skip(self, plan), fields(
        cluster_id = %plan.record.cluster_id,
        record_id = %plan.record.id,
        action = %plan.action.action_type,
    ))]
    pub async fn dispatch(&self, plan: &PlannedAction) -> DomainResult<DispatchOutcome> {
        let action_type = plan.action.action_type;
        let mut outcome = DispatchOutcome {
            record_id: plan.record.id,
            action_type,
            target: plan.target.to_string(),
            action_log_id: None,
            command: None,
            reused: false,
            error: None,
        };

        // 1. Audit entry first.
        let entry = ActionLogEntry::executing(&plan.record, action_type, plan.record.summary());
        if let Err(err) = bounded(self.timeout, "insert_action_log", self.action_logs.insert(&entry)).await {
            if err.is_timeout() {
                return Err(err);
            }
            tracing::error!(error = %err, "failed to write action log entry, command not queued");
            outcome.error = Some(format!("action log write failed: {}", err));
            return Ok(outcome);
        }
        outcome.action_log_id = Some(entry.id);

        // 2. Queue the command.
        let key = Command::idempotency_key_for(plan.record.id, action_type);
        let command = Command::new(&plan.record.cluster_id, &plan.action, self.max_retries, key)
            .with_action_log(entry.id);

        let enqueued = match bounded(self.timeout, "enqueue_command", self.queue.enqueue(&command)).await {
            Ok(enqueued) => enqueued,
            Err(err) => {
                tracing::error!(error = %err, "failed to queue command, leaving source unresolved");
                self.record_failure(entry.id, &err).await;
                if err.is_timeout() {
                    return Err(err);
                }
                outcome.error = Some(err.to_string());
                return Ok(outcome);
            }
        };

        outcome.reused = matches!(enqueued, EnqueueOutcome::Existing(_));
        let command = enqueued.into_command();
        if outcome.reused {
            tracing::info!(command_id = %command.id, "command already queued, reusing it");
        }

        // 3. Resolve the source and any merged records.
        for record_id in plan.source_record_ids() {
            match bounded(self.timeout, "mark_resolved", self.problems.mark_resolved(record_id)).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(%record_id, "record already resolved"),
                Err(err) if err.is_timeout() => return Err(err),
                Err(err) => tracing::warn!(%record_id, error = %err, "failed to mark record resolved"),
            }
        }

        let finished = if outcome.reused {
            ActionLogOutcome::already_queued(command.id)
        } else {
            let result = json!({
                "commandId": command.id,
                "actionType": command.action_type.as_str(),
                "params": command.params,
            });
            ActionLogOutcome::completed(command.id, result)
        };
        match bounded(self.timeout, "complete_action_log", self.action_logs.record_outcome(entry.id, &finished)).await {
            Ok(()) => {}
            Err(err) if err.is_timeout() => return Err(err),
            Err(err) => tracing::warn!(error = %err, "command queued but action log not completed"),
        }

        tracing::info!(command_id = %command.id, target = %outcome.target, "remediation dispatched");
        outcome.command = Some(command);
        Ok(outcome)
    }

    /// Best-effort Failed outcome for an entry whose command could not be queued.
    async fn record_failure(&self, entry_id: Uuid, cause: &DomainError) {
        let failed = ActionLogOutcome::failed(cause.to_string());
        if let Err(err) = bounded(self.timeout, "fail_action_log", self.action_logs.record_outcome(entry_id, &failed)).await {
            tracing::error!(action_log_id = %entry_id, error = %err, "failed to record dispatch failure");
        }
    }
}
