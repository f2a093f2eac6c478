//! Repository port for per-cluster auto-heal policy.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AutoHealSettings;

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Settings for a cluster, or `None` when no policy was ever configured.
    async fn get(&self, cluster_id: &str) -> DomainResult<Option<AutoHealSettings>>;

    /// Create or replace the settings of a cluster.
    async fn upsert(&self, settings: &AutoHealSettings) -> DomainResult<()>;

    async fn list(&self) -> DomainResult<Vec<AutoHealSettings>>;
}
