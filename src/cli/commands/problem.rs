//! `autoheal problem`: ingest and inspect detector records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{output, severity_color, short_id, status_cell, table, truncate, CommandOutput};
use crate::domain::models::{ProblemDetail, ProblemRecord, ProblemSource, SeverityLevel};
use crate::domain::ports::{ProblemFilter, ProblemRepository};

#[derive(Args, Debug)]
pub struct ProblemArgs {
    #[command(subcommand)]
    pub command: ProblemCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProblemCommands {
    /// Ingest problem records from a JSON file (object or array)
    Ingest {
        #[arg(long, short)]
        file: PathBuf,
    },
    /// List problem records
    List {
        #[arg(long, short)]
        cluster: Option<String>,

        /// anomaly, security_threat or pod_observation
        #[arg(long)]
        source: Option<String>,

        /// Show only unresolved records
        #[arg(long, conflicts_with = "resolved")]
        unresolved: bool,

        /// Show only resolved records
        #[arg(long)]
        resolved: bool,

        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

/// Record shape accepted from detector exports.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub cluster_id: String,
    pub severity: SeverityLevel,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub detail: ProblemDetail,
    #[serde(default)]
    pub detected_at: Option<DateTime<Utc>>,
}

impl From<ProblemInput> for ProblemRecord {
    fn from(input: ProblemInput) -> Self {
        let mut record = ProblemRecord::new(input.cluster_id, input.severity, input.kind, input.detail)
            .with_description(input.description);
        if let Some(id) = input.id {
            record.id = id;
        }
        if let Some(at) = input.detected_at {
            record.detected_at = at;
        }
        record
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ProblemInput>),
    One(Box<ProblemInput>),
}

/// Parse a detector export into records.
pub fn parse_records(content: &str) -> Result<Vec<ProblemRecord>> {
    let parsed: OneOrMany = serde_json::from_str(content).context("Invalid problem record JSON")?;
    let inputs = match parsed {
        OneOrMany::Many(inputs) => inputs,
        OneOrMany::One(input) => vec![*input],
    };
    Ok(inputs.into_iter().map(ProblemRecord::from).collect())
}

#[derive(Debug, Serialize)]
pub struct IngestOutput {
    pub ingested: Vec<Uuid>,
}

impl CommandOutput for IngestOutput {
    fn to_human(&self) -> String {
        format!("Ingested {} problem record(s)", self.ingested.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ProblemListOutput {
    pub problems: Vec<ProblemRecord>,
}

impl CommandOutput for ProblemListOutput {
    fn to_human(&self) -> String {
        if self.problems.is_empty() {
            return "No problem records found.".to_string();
        }

        let mut t = table(&["ID", "Cluster", "Source", "Kind", "Severity", "Resolved", "Description"]);
        for p in &self.problems {
            t.add_row(vec![
                Cell::new(short_id(&p.id)),
                Cell::new(&p.cluster_id),
                Cell::new(p.source().as_str()),
                Cell::new(&p.kind),
                status_cell(p.severity.as_str(), severity_color(p.severity)),
                Cell::new(if p.resolved { "yes" } else { "no" }),
                Cell::new(truncate(&p.description, 40)),
            ]);
        }
        format!("{}\n{} record(s)", t, self.problems.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ProblemArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        ProblemCommands::Ingest { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records = parse_records(&content)?;

            let mut ingested = Vec::with_capacity(records.len());
            for record in &records {
                ctx.problems
                    .insert(record)
                    .await
                    .with_context(|| format!("Failed to store problem record {}", record.id))?;
                ingested.push(record.id);
            }
            tracing::info!(count = ingested.len(), file = %file.display(), "problem records ingested");

            output(&IngestOutput { ingested }, json_mode);
        }
        ProblemCommands::List { cluster, source, unresolved, resolved, limit } => {
            let source = source
                .map(|s| {
                    ProblemSource::from_str(&s).ok_or_else(|| anyhow::anyhow!("Unknown problem source '{}'", s))
                })
                .transpose()?;
            let resolved = match (unresolved, resolved) {
                (true, _) => Some(false),
                (_, true) => Some(true),
                _ => None,
            };

            let problems = ctx
                .problems
                .list(ProblemFilter { cluster_id: cluster, source, resolved, limit: Some(limit) })
                .await?;
            output(&ProblemListOutput { problems }, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_object() {
        let json = r#"{
            "clusterId": "prod-east",
            "severity": "high",
            "kind": "crash_loop_backoff",
            "description": "api pod restarting",
            "detail": { "source": "anomaly", "affectedPods": ["prod/api-7d8f-abc"] }
        }"#;

        let records = parse_records(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cluster_id, "prod-east");
        assert_eq!(records[0].source(), ProblemSource::Anomaly);
        assert!(!records[0].resolved);
    }

    #[test]
    fn test_parse_array_keeps_supplied_id() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"[
                {{ "id": "{}", "clusterId": "c", "severity": "low", "kind": "k",
                   "detail": {{ "source": "pod_observation", "podName": "web-1" }} }},
                {{ "clusterId": "c", "severity": "critical", "kind": "privileged_container",
                   "detail": {{ "source": "security_threat" }} }}
            ]"#,
            id
        );

        let records = parse_records(&json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, id);
        assert_eq!(records[1].source(), ProblemSource::SecurityThreat);
    }

    #[test]
    fn test_parse_rejects_unknown_severity() {
        let json = r#"{ "clusterId": "c", "severity": "extreme", "kind": "k",
                        "detail": { "source": "anomaly" } }"#;
        assert!(parse_records(json).is_err());
    }
}
