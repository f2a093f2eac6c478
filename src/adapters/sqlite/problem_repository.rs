//! SQLite implementation of the ProblemRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProblemDetail, ProblemRecord, ProblemSource, SeverityLevel};
use crate::domain::ports::{ProblemFilter, ProblemRepository};

const PROBLEM_COLUMNS: &str =
    "id, cluster_id, severity, kind, description, detail, resolved, detected_at, resolved_at";

#[derive(Clone)]
pub struct SqliteProblemRepository {
    pool: SqlitePool,
}

impl SqliteProblemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProblemRepository for SqliteProblemRepository {
    async fn insert(&self, record: &ProblemRecord) -> DomainResult<()> {
        let source = record.source();
        let detail_json = serde_json::to_string(&record.detail)?;
        let status = if record.resolved { source.resolved_status() } else { "open" };

        sqlx::query(
            r#"INSERT INTO problem_records (id, cluster_id, source, precedence, severity, kind,
               description, detail, resolved, status, detected_at, resolved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.cluster_id)
        .bind(source.as_str())
        .bind(source.precedence() as i64)
        .bind(record.severity.as_str())
        .bind(&record.kind)
        .bind(&record.description)
        .bind(&detail_json)
        .bind(record.resolved)
        .bind(status)
        .bind(format_datetime(record.detected_at))
        .bind(record.resolved_at.map(format_datetime))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ProblemRecord>> {
        let row: Option<ProblemRow> =
            sqlx::query_as(&format!("SELECT {} FROM problem_records WHERE id = ?", PROBLEM_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(ProblemRecord::try_from).transpose()
    }

    async fn fetch_unresolved(
        &self,
        cluster_id: &str,
        source: ProblemSource,
        limit: u32,
    ) -> DomainResult<Vec<ProblemRecord>> {
        let rows: Vec<ProblemRow> = sqlx::query_as(&format!(
            r#"SELECT {} FROM problem_records
               WHERE cluster_id = ? AND source = ? AND resolved = 0
               ORDER BY detected_at DESC
               LIMIT ?"#,
            PROBLEM_COLUMNS
        ))
        .bind(cluster_id)
        .bind(source.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProblemRecord::try_from).collect()
    }

    async fn mark_resolved(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE problem_records
               SET resolved = 1,
                   status = CASE source WHEN 'security_threat' THEN 'mitigated' ELSE 'resolved' END,
                   resolved_at = ?
               WHERE id = ? AND resolved = 0"#,
        )
        .bind(format_datetime(chrono::Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM problem_records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(DomainError::ProblemNotFound(id)),
        }
    }

    async fn clusters_with_unresolved(&self) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT cluster_id FROM problem_records WHERE resolved = 0 ORDER BY cluster_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(cluster,)| cluster).collect())
    }

    async fn list(&self, filter: ProblemFilter) -> DomainResult<Vec<ProblemRecord>> {
        let mut query = format!("SELECT {} FROM problem_records WHERE 1=1", PROBLEM_COLUMNS);
        let mut bindings: Vec<String> = Vec::new();

        if let Some(cluster_id) = &filter.cluster_id {
            query.push_str(" AND cluster_id = ?");
            bindings.push(cluster_id.clone());
        }
        if let Some(source) = filter.source {
            query.push_str(" AND source = ?");
            bindings.push(source.as_str().to_string());
        }
        if let Some(resolved) = filter.resolved {
            query.push_str(if resolved { " AND resolved = 1" } else { " AND resolved = 0" });
        }

        query.push_str(" ORDER BY precedence ASC, detected_at DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query_as::<_, ProblemRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(ProblemRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ProblemRow {
    id: String,
    cluster_id: String,
    severity: String,
    kind: String,
    description: String,
    detail: String,
    resolved: bool,
    detected_at: String,
    resolved_at: Option<String>,
}

impl TryFrom<ProblemRow> for ProblemRecord {
    type Error = DomainError;

    fn try_from(row: ProblemRow) -> Result<Self, Self::Error> {
        let severity = SeverityLevel::from_str(&row.severity)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid severity: {}", row.severity)))?;
        let detail: ProblemDetail = serde_json::from_str(&row.detail)?;

        Ok(ProblemRecord {
            id: parse_uuid(&row.id)?,
            cluster_id: row.cluster_id,
            severity,
            kind: row.kind,
            description: row.description,
            resolved: row.resolved,
            detail,
            detected_at: parse_datetime(&row.detected_at)?,
            resolved_at: parse_optional_datetime(row.resolved_at)?,
        })
    }
}
