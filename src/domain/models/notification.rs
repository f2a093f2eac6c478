//! Operator notifications emitted once per cluster per cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Critical,
}

impl NotificationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub cluster_id: String,
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        cluster_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: NotificationSeverity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id: cluster_id.into(),
            title: title.into(),
            message: message.into(),
            severity,
            created_at: Utc::now(),
        }
    }
}
