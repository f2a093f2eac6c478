//! SQLite implementation of the ActionLogRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_optional_json, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActionLogEntry, ActionLogOutcome, ActionLogStatus, ActionType};
use crate::domain::ports::{ActionLogFilter, ActionLogRepository};

#[derive(Clone)]
pub struct SqliteActionLogRepository {
    pool: SqlitePool,
}

impl SqliteActionLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionLogRepository for SqliteActionLogRepository {
    async fn insert(&self, entry: &ActionLogEntry) -> DomainResult<()> {
        let result_json = entry.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO action_logs (id, cluster_id, action_type, trigger_reason, trigger_entity_id,
               trigger_entity_type, status, command_id, started_at, completed_at, result, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.cluster_id)
        .bind(entry.action_type.map(|a| a.as_str()))
        .bind(&entry.trigger_reason)
        .bind(entry.trigger_entity_id.to_string())
        .bind(&entry.trigger_entity_type)
        .bind(entry.status.as_str())
        .bind(entry.command_id.map(|id| id.to_string()))
        .bind(format_datetime(entry.started_at))
        .bind(entry.completed_at.map(format_datetime))
        .bind(result_json)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_outcome(&self, id: Uuid, outcome: &ActionLogOutcome) -> DomainResult<()> {
        let result_json = outcome.result.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE action_logs
               SET status = ?, command_id = COALESCE(?, command_id), result = ?,
                   error_message = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(outcome.status.as_str())
        .bind(outcome.command_id.map(|id| id.to_string()))
        .bind(result_json)
        .bind(&outcome.error_message)
        .bind(format_datetime(outcome.completed_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ActionLogNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ActionLogEntry>> {
        let row: Option<ActionLogRow> = sqlx::query_as("SELECT * FROM action_logs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ActionLogEntry::try_from).transpose()
    }

    async fn has_skip_for(&self, trigger_entity_id: Uuid) -> DomainResult<bool> {
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM action_logs WHERE trigger_entity_id = ? AND status = 'skipped' LIMIT 1",
        )
        .bind(trigger_entity_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn list(&self, filter: ActionLogFilter) -> DomainResult<Vec<ActionLogEntry>> {
        let mut query = String::from("SELECT * FROM action_logs WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(cluster_id) = &filter.cluster_id {
            query.push_str(" AND cluster_id = ?");
            bindings.push(cluster_id.clone());
        }
        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(entity_id) = filter.trigger_entity_id {
            query.push_str(" AND trigger_entity_id = ?");
            bindings.push(entity_id.to_string());
        }

        query.push_str(" ORDER BY started_at DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query_as::<_, ActionLogRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(ActionLogEntry::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ActionLogRow {
    id: String,
    cluster_id: String,
    action_type: Option<String>,
    trigger_reason: String,
    trigger_entity_id: String,
    trigger_entity_type: String,
    status: String,
    command_id: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    result: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<ActionLogRow> for ActionLogEntry {
    type Error = DomainError;

    fn try_from(row: ActionLogRow) -> Result<Self, Self::Error> {
        let action_type = row
            .action_type
            .map(|s| {
                ActionType::from_str(&s)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid action type: {}", s)))
            })
            .transpose()?;
        let status = ActionLogStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        Ok(ActionLogEntry {
            id: parse_uuid(&row.id)?,
            cluster_id: row.cluster_id,
            action_type,
            trigger_reason: row.trigger_reason,
            trigger_entity_id: parse_uuid(&row.trigger_entity_id)?,
            trigger_entity_type: row.trigger_entity_type,
            status,
            command_id: parse_optional_uuid(row.command_id)?,
            started_at: parse_datetime(&row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            result: parse_optional_json(row.result)?,
            error_message: row.error_message,
        })
    }
}
