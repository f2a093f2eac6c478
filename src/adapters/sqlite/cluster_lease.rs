//! Per-cluster reconciliation lease stored in SQLite.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use super::format_datetime;
use crate::domain::errors::DomainResult;
use crate::domain::ports::ClusterLease;

#[derive(Clone)]
pub struct SqliteClusterLease {
    pool: SqlitePool,
}

impl SqliteClusterLease {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClusterLease for SqliteClusterLease {
    async fn try_acquire(&self, cluster_id: &str, holder: &str, ttl: Duration) -> DomainResult<bool> {
        let now = Utc::now();

        // The upsert only overwrites an expired lease or our own.
        let result = sqlx::query(
            r#"INSERT INTO cluster_leases (cluster_id, holder, expires_at)
               VALUES (?, ?, ?)
               ON CONFLICT(cluster_id) DO UPDATE SET
                   holder = excluded.holder,
                   expires_at = excluded.expires_at
               WHERE cluster_leases.expires_at <= ? OR cluster_leases.holder = excluded.holder"#,
        )
        .bind(cluster_id)
        .bind(holder)
        .bind(format_datetime(now + ttl))
        .bind(format_datetime(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, cluster_id: &str, holder: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM cluster_leases WHERE cluster_id = ? AND holder = ?")
            .bind(cluster_id)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
