//! Port for serializing reconciliation per cluster.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::errors::DomainResult;

/// Exclusive, expiring lease keyed by cluster id.
///
/// A lease held by a crashed process lapses after its ttl, so a cluster is
/// never locked out permanently.
#[async_trait]
pub trait ClusterLease: Send + Sync {
    /// Take the lease for `cluster_id` unless another live holder owns it.
    async fn try_acquire(&self, cluster_id: &str, holder: &str, ttl: Duration) -> DomainResult<bool>;

    /// Give the lease up. A no-op if `holder` no longer owns it.
    async fn release(&self, cluster_id: &str, holder: &str) -> DomainResult<()>;
}
