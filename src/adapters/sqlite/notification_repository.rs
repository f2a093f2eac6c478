//! SQLite notification store. Implements NotificationSink so the reconciler
//! can write through it, plus a listing used by the CLI.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Notification, NotificationSeverity};
use crate::domain::ports::NotificationSink;

#[derive(Clone)]
pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent notifications first, optionally for one cluster.
    pub async fn list_recent(&self, cluster_id: Option<&str>, limit: u32) -> DomainResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = match cluster_id {
            Some(cluster) => {
                sqlx::query_as("SELECT * FROM notifications WHERE cluster_id = ? ORDER BY created_at DESC LIMIT ?")
                    .bind(cluster)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM notifications ORDER BY created_at DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(Notification::try_from).collect()
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationRepository {
    async fn send(&self, notification: &Notification) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, cluster_id, title, message, severity, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(notification.id.to_string())
        .bind(&notification.cluster_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.severity.as_str())
        .bind(format_datetime(notification.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    cluster_id: String,
    title: String,
    message: String,
    severity: String,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DomainError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let severity = NotificationSeverity::from_str(&row.severity)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid severity: {}", row.severity)))?;

        Ok(Notification {
            id: parse_uuid(&row.id)?,
            cluster_id: row.cluster_id,
            title: row.title,
            message: row.message,
            severity,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
