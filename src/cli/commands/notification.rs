//! `autoheal notification`: notification history.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{notification_color, output, status_cell, table, CommandOutput};
use crate::domain::models::Notification;

#[derive(Args, Debug)]
pub struct NotificationArgs {
    #[command(subcommand)]
    pub command: NotificationCommands,
}

#[derive(Subcommand, Debug)]
pub enum NotificationCommands {
    /// List recent notifications, newest first
    List {
        #[arg(long, short)]
        cluster: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u32,

        /// Print full message bodies
        #[arg(long)]
        full: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct NotificationListOutput {
    pub notifications: Vec<Notification>,
    #[serde(skip)]
    pub full: bool,
}

impl CommandOutput for NotificationListOutput {
    fn to_human(&self) -> String {
        if self.notifications.is_empty() {
            return "No notifications.".to_string();
        }

        if self.full {
            return self
                .notifications
                .iter()
                .map(|n| {
                    format!(
                        "[{}] {} {}\n{}\n",
                        n.severity.as_str(),
                        n.created_at.format("%Y-%m-%d %H:%M:%S"),
                        n.title,
                        n.message
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
        }

        let mut t = table(&["Created", "Cluster", "Severity", "Title"]);
        for n in &self.notifications {
            t.add_row(vec![
                Cell::new(n.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::new(&n.cluster_id),
                status_cell(n.severity.as_str(), notification_color(n.severity)),
                Cell::new(&n.title),
            ]);
        }
        t.to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: NotificationArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        NotificationCommands::List { cluster, limit, full } => {
            let notifications = ctx.notifications.list_recent(cluster.as_deref(), limit).await?;
            output(&NotificationListOutput { notifications, full }, json_mode);
        }
    }
    Ok(())
}
