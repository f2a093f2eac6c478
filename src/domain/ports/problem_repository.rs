//! Repository port for the detector feed.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ProblemRecord, ProblemSource};

/// Filter for listing problem records.
#[derive(Debug, Default, Clone)]
pub struct ProblemFilter {
    pub cluster_id: Option<String>,
    pub source: Option<ProblemSource>,
    pub resolved: Option<bool>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Store a record from a detector.
    async fn insert(&self, record: &ProblemRecord) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<ProblemRecord>>;

    /// Newest `limit` unresolved records of one source for a cluster, newest first.
    async fn fetch_unresolved(
        &self,
        cluster_id: &str,
        source: ProblemSource,
        limit: u32,
    ) -> DomainResult<Vec<ProblemRecord>>;

    /// Flip `resolved` to true (and the status to resolved/mitigated).
    ///
    /// Returns `false` when the record was already resolved; the flag is
    /// never reverted.
    async fn mark_resolved(&self, id: Uuid) -> DomainResult<bool>;

    /// Clusters that currently have unresolved records.
    async fn clusters_with_unresolved(&self) -> DomainResult<Vec<String>>;

    async fn list(&self, filter: ProblemFilter) -> DomainResult<Vec<ProblemRecord>>;
}
