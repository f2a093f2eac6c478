//! SQLite implementation of the SettingsRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutoHealSettings, SeverityLevel};
use crate::domain::ports::SettingsRepository;

#[derive(Clone)]
pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn get(&self, cluster_id: &str) -> DomainResult<Option<AutoHealSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as("SELECT * FROM autoheal_settings WHERE cluster_id = ?")
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AutoHealSettings::try_from).transpose()
    }

    async fn upsert(&self, settings: &AutoHealSettings) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO autoheal_settings (cluster_id, enabled, auto_apply_anomalies,
               auto_apply_security, severity_threshold, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(cluster_id) DO UPDATE SET
                   enabled = excluded.enabled,
                   auto_apply_anomalies = excluded.auto_apply_anomalies,
                   auto_apply_security = excluded.auto_apply_security,
                   severity_threshold = excluded.severity_threshold,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&settings.cluster_id)
        .bind(settings.enabled)
        .bind(settings.auto_apply_anomalies)
        .bind(settings.auto_apply_security)
        .bind(settings.severity_threshold.as_str())
        .bind(format_datetime(settings.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<AutoHealSettings>> {
        let rows: Vec<SettingsRow> = sqlx::query_as("SELECT * FROM autoheal_settings ORDER BY cluster_id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AutoHealSettings::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    cluster_id: String,
    enabled: bool,
    auto_apply_anomalies: bool,
    auto_apply_security: bool,
    severity_threshold: String,
    updated_at: String,
}

impl TryFrom<SettingsRow> for AutoHealSettings {
    type Error = DomainError;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        let severity_threshold = SeverityLevel::from_str(&row.severity_threshold).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid severity threshold: {}", row.severity_threshold))
        })?;

        Ok(AutoHealSettings {
            cluster_id: row.cluster_id,
            enabled: row.enabled,
            auto_apply_anomalies: row.auto_apply_anomalies,
            auto_apply_security: row.auto_apply_security,
            severity_threshold,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn test_missing_settings_are_none() {
        let repo = SqliteSettingsRepository::new(create_migrated_test_pool().await.unwrap());
        assert!(repo.get("cluster-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let repo = SqliteSettingsRepository::new(create_migrated_test_pool().await.unwrap());

        let mut settings = AutoHealSettings::disabled("cluster-a");
        settings.enabled = true;
        settings.auto_apply_anomalies = true;
        repo.upsert(&settings).await.unwrap();

        settings.severity_threshold = SeverityLevel::Medium;
        settings.auto_apply_security = true;
        repo.upsert(&settings).await.unwrap();

        let loaded = repo.get("cluster-a").await.unwrap().unwrap();
        assert!(loaded.enabled);
        assert!(loaded.auto_apply_security);
        assert_eq!(loaded.severity_threshold, SeverityLevel::Medium);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
