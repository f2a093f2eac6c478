//! SQLite-backed command queue.
//!
//! The `commands` table doubles as the queue: status moves
//! pending -> executing -> completed | failed, and the retry scheduler moves
//! failed (or lease-expired) rows back to pending.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_optional_json, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActionType, Command, CommandStatus};
use crate::domain::ports::{CommandFilter, CommandQueue, EnqueueOutcome};

/// Rows whose attempt failed: reported failures plus executions whose lease lapsed.
const NEEDS_RETRY: &str =
    "(status = 'failed' OR (status = 'executing' AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?))";

#[derive(Clone)]
pub struct SqliteCommandQueue {
    pool: SqlitePool,
}

impl SqliteCommandQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_by_key(&self, idempotency_key: &str) -> DomainResult<Option<Command>> {
        let row: Option<CommandRow> = sqlx::query_as("SELECT * FROM commands WHERE idempotency_key = ?")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Command::try_from).transpose()
    }

    /// Apply an executor report to an Executing command that has not been
    /// reported as exhausted.
    async fn finish(
        &self,
        id: Uuid,
        status: CommandStatus,
        result: Option<String>,
        error: Option<&str>,
    ) -> DomainResult<Command> {
        let row: Option<CommandRow> = sqlx::query_as(
            r#"UPDATE commands
               SET status = ?, result = ?, error_message = ?, lease_expires_at = NULL, updated_at = ?
               WHERE id = ? AND status = 'executing' AND exhausted_reported_at IS NULL
               RETURNING *"#,
        )
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .bind(format_datetime(Utc::now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Command::try_from(row);
        }

        match self.get(id).await? {
            Some(current) => Err(DomainError::InvalidStateTransition {
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: format!("command {} is not executing", id),
            }),
            None => Err(DomainError::CommandNotFound(id)),
        }
    }
}

#[async_trait]
impl CommandQueue for SqliteCommandQueue {
    async fn enqueue(&self, command: &Command) -> DomainResult<EnqueueOutcome> {
        let params_json = serde_json::to_string(&command.params)?;
        let result_json = command.result.as_ref().map(serde_json::to_string).transpose()?;

        let inserted = sqlx::query(
            r#"INSERT INTO commands (id, cluster_id, action_type, params, status, retry_count,
               max_retries, next_retry_at, lease_expires_at, result, error_message, idempotency_key,
               action_log_id, exhausted_reported_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(idempotency_key) DO NOTHING"#,
        )
        .bind(command.id.to_string())
        .bind(&command.cluster_id)
        .bind(command.action_type.as_str())
        .bind(&params_json)
        .bind(command.status.as_str())
        .bind(command.retry_count as i64)
        .bind(command.max_retries as i64)
        .bind(command.next_retry_at.map(format_datetime))
        .bind(command.lease_expires_at.map(format_datetime))
        .bind(result_json)
        .bind(&command.error_message)
        .bind(&command.idempotency_key)
        .bind(command.action_log_id.map(|id| id.to_string()))
        .bind(command.exhausted_reported_at.map(format_datetime))
        .bind(format_datetime(command.created_at))
        .bind(format_datetime(command.updated_at))
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            return Ok(EnqueueOutcome::Created(command.clone()));
        }

        self.get_by_key(&command.idempotency_key)
            .await?
            .map(EnqueueOutcome::Existing)
            .ok_or_else(|| {
                DomainError::DatabaseError(format!(
                    "command with idempotency key '{}' vanished during enqueue",
                    command.idempotency_key
                ))
            })
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>> {
        let row: Option<CommandRow> = sqlx::query_as("SELECT * FROM commands WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Command::try_from).transpose()
    }

    async fn lease(&self, cluster_id: &str, limit: u32, lease_for: Duration) -> DomainResult<Vec<Command>> {
        let now = Utc::now();
        let now_str = format_datetime(now);

        let rows: Vec<CommandRow> = sqlx::query_as(
            r#"UPDATE commands
               SET status = 'executing', lease_expires_at = ?, updated_at = ?
               WHERE id IN (
                   SELECT id FROM commands
                   WHERE cluster_id = ? AND status = 'pending'
                     AND (next_retry_at IS NULL OR next_retry_at <= ?)
                   ORDER BY created_at ASC
                   LIMIT ?
               )
               RETURNING *"#,
        )
        .bind(format_datetime(now + lease_for))
        .bind(&now_str)
        .bind(cluster_id)
        .bind(&now_str)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut leased = rows.into_iter().map(Command::try_from).collect::<DomainResult<Vec<_>>>()?;
        leased.sort_by_key(|c| c.created_at);
        Ok(leased)
    }

    async fn ack(&self, id: Uuid, result: serde_json::Value) -> DomainResult<Command> {
        let result_json = serde_json::to_string(&result)?;
        self.finish(id, CommandStatus::Completed, Some(result_json), None).await
    }

    async fn nack(&self, id: Uuid, error: &str) -> DomainResult<Command> {
        self.finish(id, CommandStatus::Failed, None, Some(error)).await
    }

    async fn list_retryable(&self, now: DateTime<Utc>, limit: u32) -> DomainResult<Vec<Command>> {
        let now_str = format_datetime(now);
        let rows: Vec<CommandRow> = sqlx::query_as(&format!(
            r#"SELECT * FROM commands
               WHERE {} AND retry_count < max_retries
                 AND (next_retry_at IS NULL OR next_retry_at <= ?)
               ORDER BY updated_at ASC
               LIMIT ?"#,
            NEEDS_RETRY
        ))
        .bind(&now_str)
        .bind(&now_str)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Command::try_from).collect()
    }

    async fn rearm(&self, command: &Command, observed_retry_count: u32) -> DomainResult<bool> {
        let result = sqlx::query(&format!(
            r#"UPDATE commands
               SET status = 'pending', retry_count = ?, next_retry_at = ?,
                   lease_expires_at = NULL, updated_at = ?
               WHERE id = ? AND retry_count = ? AND retry_count < max_retries AND {}"#,
            NEEDS_RETRY
        ))
        .bind(command.retry_count as i64)
        .bind(command.next_retry_at.map(format_datetime))
        .bind(format_datetime(command.updated_at))
        .bind(command.id.to_string())
        .bind(observed_retry_count as i64)
        .bind(format_datetime(command.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_exhausted_unreported(&self, cluster_id: Option<&str>, now: DateTime<Utc>) -> DomainResult<Vec<Command>> {
        let rows: Vec<CommandRow> = sqlx::query_as(&format!(
            r#"SELECT * FROM commands
               WHERE (? IS NULL OR cluster_id = ?) AND retry_count >= max_retries
                 AND exhausted_reported_at IS NULL AND {}
               ORDER BY cluster_id, updated_at ASC"#,
            NEEDS_RETRY
        ))
        .bind(cluster_id)
        .bind(cluster_id)
        .bind(format_datetime(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Command::try_from).collect()
    }

    async fn mark_exhausted_reported(&self, ids: &[Uuid], at: DateTime<Utc>) -> DomainResult<()> {
        let at = format_datetime(at);
        let mut tx = self.pool.begin().await?;
        for id in ids {
            // A lapsed execution becomes Failed so a late executor report cannot complete it.
            sqlx::query(
                r#"UPDATE commands
                   SET exhausted_reported_at = ?, status = 'failed', lease_expires_at = NULL,
                       error_message = COALESCE(error_message, 'lease expired before the executor reported'),
                       updated_at = ?
                   WHERE id = ? AND exhausted_reported_at IS NULL AND status IN ('failed', 'executing')"#,
            )
            .bind(&at)
            .bind(&at)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, filter: CommandFilter) -> DomainResult<Vec<Command>> {
        let mut query = String::from("SELECT * FROM commands WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(cluster_id) = &filter.cluster_id {
            query.push_str(" AND cluster_id = ?");
            bindings.push(cluster_id.clone());
        }
        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query_as::<_, CommandRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Command::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CommandRow {
    id: String,
    cluster_id: String,
    action_type: String,
    params: String,
    status: String,
    retry_count: i64,
    max_retries: i64,
    next_retry_at: Option<String>,
    lease_expires_at: Option<String>,
    result: Option<String>,
    error_message: Option<String>,
    idempotency_key: String,
    action_log_id: Option<String>,
    exhausted_reported_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CommandRow> for Command {
    type Error = DomainError;

    fn try_from(row: CommandRow) -> Result<Self, Self::Error> {
        let action_type = ActionType::from_str(&row.action_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid action type: {}", row.action_type)))?;
        let status = CommandStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let params: BTreeMap<String, String> = serde_json::from_str(&row.params)?;

        Ok(Command {
            id: parse_uuid(&row.id)?,
            cluster_id: row.cluster_id,
            action_type,
            params,
            status,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            next_retry_at: parse_optional_datetime(row.next_retry_at)?,
            lease_expires_at: parse_optional_datetime(row.lease_expires_at)?,
            result: parse_optional_json(row.result)?,
            error_message: row.error_message,
            idempotency_key: row.idempotency_key,
            action_log_id: parse_optional_uuid(row.action_log_id)?,
            exhausted_reported_at: parse_optional_datetime(row.exhausted_reported_at)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::RemediationAction;

    async fn setup_queue() -> SqliteCommandQueue {
        SqliteCommandQueue::new(create_migrated_test_pool().await.unwrap())
    }

    fn restart_command(key: &str) -> Command {
        let action = RemediationAction::new(ActionType::RestartPod)
            .with_param("namespace", "prod")
            .with_param("pod_name", "api-7d8f9c-x2x");
        Command::new("cluster-a", &action, 3, key)
    }

    async fn lease_and_nack(queue: &SqliteCommandQueue, id: Uuid) {
        let leased = queue.lease("cluster-a", 10, Duration::minutes(10)).await.unwrap();
        assert!(leased.iter().any(|c| c.id == id));
        queue.nack(id, "kubectl exited 1").await.unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let queue = setup_queue().await;
        let first = restart_command("rec-1:restart_pod");
        let second = restart_command("rec-1:restart_pod");

        assert!(matches!(queue.enqueue(&first).await.unwrap(), EnqueueOutcome::Created(_)));
        let outcome = queue.enqueue(&second).await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Existing(_)));
        assert_eq!(outcome.command().id, first.id);

        let all = queue.list(CommandFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].params.get("pod_name").map(String::as_str), Some("api-7d8f9c-x2x"));
    }

    #[tokio::test]
    async fn test_lease_ack_lifecycle() {
        let queue = setup_queue().await;
        let command = restart_command("rec-1:restart_pod");
        queue.enqueue(&command).await.unwrap();

        let leased = queue.lease("cluster-a", 10, Duration::minutes(5)).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].status, CommandStatus::Executing);
        assert!(leased[0].lease_expires_at.is_some());

        assert!(queue.lease("cluster-a", 10, Duration::minutes(5)).await.unwrap().is_empty());

        let done = queue.ack(command.id, serde_json::json!({"restarted": true})).await.unwrap();
        assert_eq!(done.status, CommandStatus::Completed);
        assert_eq!(done.result, Some(serde_json::json!({"restarted": true})));

        let err = queue.ack(command.id, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_nack_unknown_command() {
        let queue = setup_queue().await;
        let err = queue.nack(Uuid::new_v4(), "boom").await.unwrap_err();
        assert!(matches!(err, DomainError::CommandNotFound(_)));
    }

    #[tokio::test]
    async fn test_lease_skips_commands_not_yet_due() {
        let queue = setup_queue().await;
        let mut command = restart_command("rec-1:restart_pod");
        command.next_retry_at = Some(Utc::now() + Duration::minutes(1));
        queue.enqueue(&command).await.unwrap();

        assert!(queue.lease("cluster-a", 10, Duration::minutes(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rearm_guarded_by_observed_retry_count() {
        let queue = setup_queue().await;
        let command = restart_command("rec-1:restart_pod");
        queue.enqueue(&command).await.unwrap();
        lease_and_nack(&queue, command.id).await;

        let now = Utc::now();
        let retryable = queue.list_retryable(now, 10).await.unwrap();
        assert_eq!(retryable.len(), 1);

        let mut rearmed = retryable[0].clone();
        rearmed.rearm(now, now).unwrap();
        assert!(queue.rearm(&rearmed, 0).await.unwrap());
        // A second scheduler holding the same stale snapshot loses.
        assert!(!queue.rearm(&rearmed, 0).await.unwrap());

        let stored = queue.get(command.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CommandStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_is_retryable() {
        let queue = setup_queue().await;
        let command = restart_command("rec-1:restart_pod");
        queue.enqueue(&command).await.unwrap();
        queue.lease("cluster-a", 10, Duration::seconds(30)).await.unwrap();

        assert!(queue.list_retryable(Utc::now(), 10).await.unwrap().is_empty());
        let later = Utc::now() + Duration::minutes(1);
        let retryable = queue.list_retryable(later, 10).await.unwrap();
        assert_eq!(retryable.len(), 1);
        assert!(retryable[0].lease_expired(later));
    }

    #[tokio::test]
    async fn test_exhausted_commands_reported_once() {
        let queue = setup_queue().await;
        let mut command = restart_command("rec-1:restart_pod");
        command.max_retries = 0;
        queue.enqueue(&command).await.unwrap();
        lease_and_nack(&queue, command.id).await;

        let now = Utc::now();
        assert!(queue.list_retryable(now, 10).await.unwrap().is_empty());

        let exhausted = queue.list_exhausted_unreported(Some("cluster-a"), now).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert!(queue.list_exhausted_unreported(Some("cluster-b"), now).await.unwrap().is_empty());
        assert_eq!(queue.list_exhausted_unreported(None, now).await.unwrap().len(), 1);

        queue.mark_exhausted_reported(&[command.id], now).await.unwrap();
        assert!(queue.list_exhausted_unreported(Some("cluster-a"), now).await.unwrap().is_empty());

        let stored = queue.get(command.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CommandStatus::Failed);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test]
    async fn test_late_ack_after_exhaustion_report_is_rejected() {
        let queue = setup_queue().await;
        let mut command = restart_command("rec-1:restart_pod");
        command.max_retries = 0;
        queue.enqueue(&command).await.unwrap();
        queue.lease("cluster-a", 10, Duration::seconds(30)).await.unwrap();

        let later = Utc::now() + Duration::minutes(1);
        let exhausted = queue.list_exhausted_unreported(Some("cluster-a"), later).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        queue.mark_exhausted_reported(&[command.id], later).await.unwrap();

        let stored = queue.get(command.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CommandStatus::Failed);
        assert!(stored.lease_expires_at.is_none());
        assert!(stored.error_message.unwrap().contains("lease expired"));

        let err = queue.ack(command.id, serde_json::json!({"restarted": true})).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(queue.get(command.id).await.unwrap().unwrap().status, CommandStatus::Failed);
    }
}
