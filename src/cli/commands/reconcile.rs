//! `autoheal reconcile`: one reconciliation cycle for a cluster.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, status_cell, table, CommandOutput};
use crate::domain::models::NotificationSeverity;
use crate::services::{CycleReport, DispatchOutcome};
use comfy_table::{Cell, Color};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Cluster to reconcile
    #[arg(long, short)]
    pub cluster: String,

    /// Bypass the severity policy for this cycle
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct OutcomeOutput {
    pub record_id: String,
    pub action_type: String,
    pub target: String,
    pub command_id: Option<String>,
    pub reused: bool,
    pub error: Option<String>,
}

impl From<&DispatchOutcome> for OutcomeOutput {
    fn from(outcome: &DispatchOutcome) -> Self {
        Self {
            record_id: outcome.record_id.to_string(),
            action_type: outcome.action_type.to_string(),
            target: outcome.target.clone(),
            command_id: outcome.command.as_ref().map(|c| c.id.to_string()),
            reused: outcome.reused,
            error: outcome.error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CycleOutput {
    pub cluster_id: String,
    pub status: String,
    pub examined: usize,
    pub denied: usize,
    pub skipped: usize,
    pub merged: usize,
    pub deferred: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub exhausted: usize,
    pub outcomes: Vec<OutcomeOutput>,
    pub notification: Option<String>,
    pub notification_severity: Option<NotificationSeverity>,
}

impl From<&CycleReport> for CycleOutput {
    fn from(report: &CycleReport) -> Self {
        Self {
            cluster_id: report.cluster_id.clone(),
            status: report.status.as_str().to_string(),
            examined: report.examined,
            denied: report.denied,
            skipped: report.skipped,
            merged: report.merged,
            deferred: report.deferred,
            succeeded: report.succeeded(),
            failed: report.failed(),
            exhausted: report.exhausted,
            outcomes: report.outcomes.iter().map(OutcomeOutput::from).collect(),
            notification: report.notification.as_ref().map(|n| n.title.clone()),
            notification_severity: report.notification.as_ref().map(|n| n.severity),
        }
    }
}

impl CommandOutput for CycleOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Cycle {} for {}: {} examined, {} denied by policy, {} skipped, {} merged, {} deferred",
            self.status, self.cluster_id, self.examined, self.denied, self.skipped, self.merged, self.deferred
        )];

        if !self.outcomes.is_empty() {
            let mut t = table(&["Action", "Target", "Command", "Result"]);
            for o in &self.outcomes {
                let result = match (&o.error, o.reused) {
                    (Some(err), _) => status_cell(err, Color::Red),
                    (None, true) => status_cell("already queued", Color::Yellow),
                    (None, false) => status_cell("queued", Color::Green),
                };
                t.add_row(vec![
                    Cell::new(&o.action_type),
                    Cell::new(&o.target),
                    Cell::new(o.command_id.as_deref().map_or("-", |id| &id[..8])),
                    result,
                ]);
            }
            lines.push(t.to_string());
        }

        if self.exhausted > 0 {
            lines.push(format!("{} command(s) exhausted their retries", self.exhausted));
        }
        if let Some(title) = &self.notification {
            lines.push(format!("Notification: {}", title));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ReconcileArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let reconciler = ctx.reconciler()?;
    let report = reconciler
        .reconcile(&args.cluster, args.force)
        .await
        .with_context(|| format!("Reconciliation of {} aborted", args.cluster))?;

    output(&CycleOutput::from(&report), json_mode);
    Ok(())
}
