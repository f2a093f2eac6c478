//! `autoheal command`: inspect the command queue and act as the executor side.
//!
//! `lease`, `ack` and `nack` are the executor agent's half of the queue
//! protocol, exposed here for operators and integration testing.

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Args, Subcommand};
use comfy_table::Cell;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::{command_status_color, output, short_id, status_cell, table, truncate, CommandOutput};
use crate::domain::models::{Command, CommandStatus};
use crate::domain::ports::{CommandFilter, CommandQueue};

#[derive(Args, Debug)]
pub struct CommandArgs {
    #[command(subcommand)]
    pub command: CommandCommands,
}

#[derive(Subcommand, Debug)]
pub enum CommandCommands {
    /// List queued commands
    List {
        #[arg(long, short)]
        cluster: Option<String>,

        /// pending, executing, completed or failed
        #[arg(long, value_parser = parse_status)]
        status: Option<CommandStatus>,

        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Lease pending commands for execution
    Lease {
        #[arg(long, short)]
        cluster: String,

        #[arg(long, default_value = "10")]
        limit: u32,

        /// Lease duration; defaults to retry.executor_lease_secs
        #[arg(long)]
        lease_secs: Option<u64>,
    },
    /// Report a leased command as completed
    Ack {
        id: Uuid,

        /// Executor result as JSON
        #[arg(long)]
        result: Option<String>,
    },
    /// Report a leased command as failed
    Nack {
        id: Uuid,

        #[arg(long)]
        error: String,
    },
}

fn parse_status(s: &str) -> Result<CommandStatus, String> {
    CommandStatus::from_str(s).ok_or_else(|| format!("invalid command status '{}'", s))
}

#[derive(Debug, Serialize)]
pub struct CommandListOutput {
    pub commands: Vec<Command>,
}

impl CommandOutput for CommandListOutput {
    fn to_human(&self) -> String {
        if self.commands.is_empty() {
            return "No commands found.".to_string();
        }

        let mut t = table(&["ID", "Cluster", "Action", "Target", "Status", "Retries", "Next retry", "Error"]);
        for c in &self.commands {
            t.add_row(vec![
                Cell::new(short_id(&c.id)),
                Cell::new(&c.cluster_id),
                Cell::new(c.action_type.as_str()),
                Cell::new(c.target_label()),
                status_cell(c.status.as_str(), command_status_color(c.status)),
                Cell::new(format!("{}/{}", c.retry_count, c.max_retries)),
                Cell::new(
                    c.next_retry_at
                        .map(|at| at.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(truncate(c.error_message.as_deref().unwrap_or(""), 40)),
            ]);
        }
        format!("{}\n{} command(s)", t, self.commands.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct CommandReportOutput {
    pub command: Command,
}

impl CommandOutput for CommandReportOutput {
    fn to_human(&self) -> String {
        format!(
            "Command {} ({} on {}) is now {}",
            self.command.id,
            self.command.action_type,
            self.command.target_label(),
            self.command.status
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CommandArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        CommandCommands::List { cluster, status, limit } => {
            let commands = ctx
                .queue
                .list(CommandFilter { cluster_id: cluster, status, limit: Some(limit) })
                .await?;
            output(&CommandListOutput { commands }, json_mode);
        }
        CommandCommands::Lease { cluster, limit, lease_secs } => {
            let secs = lease_secs.unwrap_or(ctx.config.retry.executor_lease_secs);
            let lease_for = Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(86_400));
            let commands = ctx
                .queue
                .lease(&cluster, limit, lease_for)
                .await
                .with_context(|| format!("Failed to lease commands for {}", cluster))?;
            output(&CommandListOutput { commands }, json_mode);
        }
        CommandCommands::Ack { id, result } => {
            let result: serde_json::Value = match result {
                Some(raw) => serde_json::from_str(&raw).context("--result must be valid JSON")?,
                None => serde_json::json!({ "success": true }),
            };
            let command = ctx.queue.ack(id, result).await?;
            output(&CommandReportOutput { command }, json_mode);
        }
        CommandCommands::Nack { id, error } => {
            let command = ctx.queue.nack(id, &error).await?;
            output(&CommandReportOutput { command }, json_mode);
        }
    }
    Ok(())
}
