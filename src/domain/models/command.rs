//! Durable remediation commands handed to the in-cluster executor agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::action::{ActionType, RemediationAction};
use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle of a queued command.
///
/// This engine writes `Pending` (on creation and re-arm); the executor agent
/// writes `Executing`, `Completed` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "executing" | "running" => Some(Self::Executing),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<CommandStatus> {
        match self {
            Self::Pending => vec![Self::Executing],
            // An expired lease is re-armed straight back to Pending.
            Self::Executing => vec![Self::Completed, Self::Failed, Self::Pending],
            Self::Completed => vec![],
            Self::Failed => vec![Self::Pending],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued instruction for the executor agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub cluster_id: String,
    pub action_type: ActionType,
    pub params: BTreeMap<String, String>,
    pub status: CommandStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Earliest time the command may be leased (after re-arm) or re-armed (after failure).
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the executor's current lease lapses if it never reports back.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// `"{source_record_id}:{action_type}"`; a second enqueue with the same key is a no-op.
    pub idempotency_key: String,
    pub action_log_id: Option<Uuid>,
    pub exhausted_reported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Command {
    pub fn new(
        cluster_id: impl Into<String>,
        action: &RemediationAction,
        max_retries: u32,
        idempotency_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cluster_id: cluster_id.into(),
            action_type: action.action_type,
            params: action.params.clone(),
            status: CommandStatus::Pending,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            lease_expires_at: None,
            result: None,
            error_message: None,
            idempotency_key: idempotency_key.into(),
            action_log_id: None,
            exhausted_reported_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_action_log(mut self, log_id: Uuid) -> Self {
        self.action_log_id = Some(log_id);
        self
    }

    /// Idempotency key for a command raised by a given source record.
    pub fn idempotency_key_for(source_record_id: Uuid, action_type: ActionType) -> String {
        format!("{}:{}", source_record_id, action_type.as_str())
    }

    /// True once the executor holds the command past its lease without reporting.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CommandStatus::Executing
            && self.lease_expires_at.is_some_and(|expires| expires <= now)
    }

    /// True when the command needs a retry: failed, or abandoned mid-lease.
    pub fn needs_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == CommandStatus::Failed || self.lease_expired(now)
    }

    /// True when the command failed and has no attempts left.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.needs_retry(now) && self.retry_count >= self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            CommandStatus::Completed => true,
            CommandStatus::Failed => self.retry_count >= self.max_retries,
            CommandStatus::Pending | CommandStatus::Executing => false,
        }
    }

    /// Whether the retry scheduler may re-arm the command at `now`.
    pub fn can_rearm(&self, now: DateTime<Utc>) -> bool {
        self.needs_retry(now)
            && self.retry_count < self.max_retries
            && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// Reset to `Pending` for another attempt no earlier than `next_retry_at`.
    pub fn rearm(&mut self, now: DateTime<Utc>, next_retry_at: DateTime<Utc>) -> DomainResult<()> {
        if !self.can_rearm(now) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: CommandStatus::Pending.as_str().to_string(),
                reason: format!(
                    "command {} is not eligible for retry (attempt {}/{})",
                    self.id, self.retry_count, self.max_retries
                ),
            });
        }

        self.retry_count += 1;
        self.status = CommandStatus::Pending;
        self.next_retry_at = Some(next_retry_at);
        self.lease_expires_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Short description of what the command targets.
    pub fn target_label(&self) -> String {
        let namespace = self.params.get("namespace").map_or("default", String::as_str);
        let object = self
            .params
            .get("pod_name")
            .or_else(|| self.params.get("deployment_name"))
            .map_or("-", String::as_str);
        format!("{}/{}", namespace, object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn failed_command(retry_count: u32, max_retries: u32) -> Command {
        let action = RemediationAction::new(ActionType::RestartPod)
            .with_param("namespace", "prod")
            .with_param("pod_name", "api-1");
        let mut command = Command::new("cluster-a", &action, max_retries, "rec:restart_pod");
        command.status = CommandStatus::Failed;
        command.retry_count = retry_count;
        command
    }

    #[test]
    fn test_status_transitions() {
        assert!(CommandStatus::Pending.can_transition_to(CommandStatus::Executing));
        assert!(!CommandStatus::Pending.can_transition_to(CommandStatus::Completed));
        assert!(CommandStatus::Executing.can_transition_to(CommandStatus::Completed));
        assert!(CommandStatus::Failed.can_transition_to(CommandStatus::Pending));
        assert!(CommandStatus::Completed.valid_transitions().is_empty());
    }

    #[test]
    fn test_rearm_increments_and_resets() {
        let now = Utc::now();
        let mut command = failed_command(0, 3);
        command.rearm(now, now + Duration::seconds(20)).unwrap();

        assert_eq!(command.status, CommandStatus::Pending);
        assert_eq!(command.retry_count, 1);
        assert_eq!(command.next_retry_at, Some(now + Duration::seconds(20)));
    }

    #[test]
    fn test_rearm_respects_next_retry_at() {
        let now = Utc::now();
        let mut command = failed_command(1, 3);
        command.next_retry_at = Some(now + Duration::seconds(30));

        assert!(!command.can_rearm(now));
        assert!(command.rearm(now, now + Duration::seconds(60)).is_err());
        assert!(command.can_rearm(now + Duration::seconds(30)));
    }

    #[test]
    fn test_exhausted_command_never_rearmed() {
        let now = Utc::now();
        let mut command = failed_command(3, 3);

        assert!(command.is_exhausted(now));
        assert!(command.is_terminal());
        assert!(command.rearm(now, now).is_err());
        assert_eq!(command.retry_count, 3);
        assert_eq!(command.status, CommandStatus::Failed);
    }

    #[test]
    fn test_expired_lease_counts_as_needing_retry() {
        let now = Utc::now();
        let mut command = failed_command(0, 3);
        command.status = CommandStatus::Executing;
        command.lease_expires_at = Some(now - Duration::seconds(1));

        assert!(command.lease_expired(now));
        assert!(command.can_rearm(now));

        command.lease_expires_at = Some(now + Duration::seconds(60));
        assert!(!command.needs_retry(now));
    }

    #[test]
    fn test_target_label() {
        let command = failed_command(0, 3);
        assert_eq!(command.target_label(), "prod/api-1");
    }
}
