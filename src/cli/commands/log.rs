//! `autoheal log`: the remediation audit trail.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{log_status_color, output, short_id, status_cell, table, truncate, CommandOutput};
use crate::domain::models::{ActionLogEntry, ActionLogStatus};
use crate::domain::ports::{ActionLogFilter, ActionLogRepository};

#[derive(Args, Debug)]
pub struct LogArgs {
    #[command(subcommand)]
    pub command: LogCommands,
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// List action log entries, newest first
    List {
        #[arg(long, short)]
        cluster: Option<String>,

        /// pending, executing, completed, failed or skipped
        #[arg(long, value_parser = parse_status)]
        status: Option<ActionLogStatus>,

        /// Only entries triggered by this problem record
        #[arg(long)]
        record: Option<Uuid>,

        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

fn parse_status(s: &str) -> Result<ActionLogStatus, String> {
    ActionLogStatus::from_str(s).ok_or_else(|| format!("invalid action log status '{}'", s))
}

#[derive(Debug, Serialize)]
pub struct LogListOutput {
    pub entries: Vec<ActionLogEntry>,
}

impl CommandOutput for LogListOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No action log entries found.".to_string();
        }

        let mut t = table(&["ID", "Started", "Cluster", "Action", "Status", "Command", "Reason"]);
        for e in &self.entries {
            let reason = match e.status {
                ActionLogStatus::Skipped | ActionLogStatus::Failed => {
                    e.error_message.as_deref().unwrap_or(e.trigger_reason.as_str())
                }
                _ => e.trigger_reason.as_str(),
            };
            t.add_row(vec![
                Cell::new(short_id(&e.id)),
                Cell::new(e.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::new(&e.cluster_id),
                Cell::new(e.action_type.map_or("-", |a| a.as_str())),
                status_cell(e.status.as_str(), log_status_color(e.status)),
                Cell::new(e.command_id.map(|id| short_id(&id)).unwrap_or_else(|| "-".to_string())),
                Cell::new(truncate(reason, 50)),
            ]);
        }
        format!("{}\n{} entr{}", t, self.entries.len(), if self.entries.len() == 1 { "y" } else { "ies" })
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: LogArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        LogCommands::List { cluster, status, record, limit } => {
            let entries = ctx
                .action_logs
                .list(ActionLogFilter {
                    cluster_id: cluster,
                    status,
                    trigger_entity_id: record,
                    limit: Some(limit),
                })
                .await?;
            output(&LogListOutput { entries }, json_mode);
        }
    }
    Ok(())
}
