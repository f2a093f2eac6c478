//! Repository port for the remediation audit trail.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActionLogEntry, ActionLogOutcome, ActionLogStatus};

/// Filter for listing audit entries.
#[derive(Debug, Default, Clone)]
pub struct ActionLogFilter {
    pub cluster_id: Option<String>,
    pub status: Option<ActionLogStatus>,
    pub trigger_entity_id: Option<Uuid>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait ActionLogRepository: Send + Sync {
    async fn insert(&self, entry: &ActionLogEntry) -> DomainResult<()>;

    /// Write the terminal outcome of an entry created in Executing.
    async fn record_outcome(&self, id: Uuid, outcome: &ActionLogOutcome) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<ActionLogEntry>>;

    /// Whether a Skipped entry already exists for a problem record.
    async fn has_skip_for(&self, trigger_entity_id: Uuid) -> DomainResult<bool>;

    /// Entries newest first.
    async fn list(&self, filter: ActionLogFilter) -> DomainResult<Vec<ActionLogEntry>>;
}
