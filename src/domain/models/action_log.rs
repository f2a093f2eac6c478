//! Append-only audit trail of remediation attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::action::ActionType;
use super::problem::ProblemRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLogStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

impl ActionLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ActionLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remediation attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Uuid,
    pub cluster_id: String,
    /// `None` when the attempt was skipped before an action was chosen.
    pub action_type: Option<ActionType>,
    pub trigger_reason: String,
    pub trigger_entity_id: Uuid,
    pub trigger_entity_type: String,
    pub status: ActionLogStatus,
    pub command_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl ActionLogEntry {
    /// Entry written before the command insert is attempted.
    pub fn executing(record: &ProblemRecord, action_type: ActionType, trigger_reason: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id: record.cluster_id.clone(),
            action_type: Some(action_type),
            trigger_reason,
            trigger_entity_id: record.id,
            trigger_entity_type: record.source().as_str().to_string(),
            status: ActionLogStatus::Executing,
            command_id: None,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    /// Entry recording that a record was not acted upon.
    pub fn skipped(
        record: &ProblemRecord,
        action_type: Option<ActionType>,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cluster_id: record.cluster_id.clone(),
            action_type,
            trigger_reason: record.summary(),
            trigger_entity_id: record.id,
            trigger_entity_type: record.source().as_str().to_string(),
            status: ActionLogStatus::Skipped,
            command_id: None,
            started_at: now,
            completed_at: Some(now),
            result: None,
            error_message: Some(reason.into()),
        }
    }
}

/// Terminal outcome written back to an entry after the command insert.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLogOutcome {
    pub status: ActionLogStatus,
    pub command_id: Option<Uuid>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ActionLogOutcome {
    pub fn completed(command_id: Uuid, result: serde_json::Value) -> Self {
        Self {
            status: ActionLogStatus::Completed,
            command_id: Some(command_id),
            result: Some(result),
            error_message: None,
            completed_at: Utc::now(),
        }
    }

    /// The command was already queued by an earlier entry. The command id
    /// goes in the reason so the command keeps a single owning entry.
    pub fn already_queued(command_id: Uuid) -> Self {
        Self {
            status: ActionLogStatus::Skipped,
            command_id: None,
            result: None,
            error_message: Some(format!("command already queued: {}", command_id)),
            completed_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ActionLogStatus::Failed,
            command_id: None,
            result: None,
            error_message: Some(error.into()),
            completed_at: Utc::now(),
        }
    }
}
