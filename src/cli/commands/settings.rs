//! `autoheal settings`: per-cluster auto-heal policy.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, status_cell, table, CommandOutput};
use crate::domain::models::{AutoHealSettings, SeverityLevel};
use crate::domain::ports::SettingsRepository;

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show settings for one cluster, or all clusters
    Show {
        #[arg(long, short)]
        cluster: Option<String>,
    },
    /// Create or update settings for a cluster
    Set {
        #[arg(long, short)]
        cluster: String,

        /// Master switch for auto-heal on this cluster
        #[arg(long)]
        enabled: Option<bool>,

        /// Auto-apply remediations for anomalies and pod observations
        #[arg(long)]
        anomalies: Option<bool>,

        /// Auto-apply remediations for security threats
        #[arg(long)]
        security: Option<bool>,

        /// Minimum severity acted upon (low, medium, high, critical)
        #[arg(long, value_parser = parse_severity)]
        threshold: Option<SeverityLevel>,
    },
}

fn parse_severity(s: &str) -> Result<SeverityLevel, String> {
    SeverityLevel::from_str(s).ok_or_else(|| format!("invalid severity '{}'", s))
}

#[derive(Debug, Serialize)]
pub struct SettingsListOutput {
    pub settings: Vec<AutoHealSettings>,
    /// Set when a single cluster was requested but has no stored row.
    pub defaulted: bool,
}

fn flag_cell(on: bool) -> Cell {
    if on {
        status_cell("on", Color::Green)
    } else {
        status_cell("off", Color::DarkGrey)
    }
}

impl CommandOutput for SettingsListOutput {
    fn to_human(&self) -> String {
        if self.settings.is_empty() {
            return "No cluster settings stored. Auto-heal is disabled everywhere.".to_string();
        }

        let mut t = table(&["Cluster", "Enabled", "Anomalies", "Security", "Threshold", "Updated"]);
        for s in &self.settings {
            t.add_row(vec![
                Cell::new(&s.cluster_id),
                flag_cell(s.enabled),
                flag_cell(s.auto_apply_anomalies),
                flag_cell(s.auto_apply_security),
                Cell::new(s.severity_threshold.as_str()),
                Cell::new(s.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }

        let mut out = t.to_string();
        if self.defaulted {
            out.push_str("\n(no stored settings; showing disabled defaults)");
        }
        out
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: SettingsArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match args.command {
        SettingsCommands::Show { cluster } => {
            let out = match cluster {
                Some(cluster) => match ctx.settings.get(&cluster).await? {
                    Some(settings) => SettingsListOutput { settings: vec![settings], defaulted: false },
                    None => SettingsListOutput {
                        settings: vec![AutoHealSettings::disabled(cluster)],
                        defaulted: true,
                    },
                },
                None => SettingsListOutput { settings: ctx.settings.list().await?, defaulted: false },
            };
            output(&out, json_mode);
        }
        SettingsCommands::Set { cluster, enabled, anomalies, security, threshold } => {
            let mut settings = ctx
                .settings
                .get(&cluster)
                .await?
                .unwrap_or_else(|| AutoHealSettings::disabled(&cluster));

            if let Some(v) = enabled {
                settings.enabled = v;
            }
            if let Some(v) = anomalies {
                settings.auto_apply_anomalies = v;
            }
            if let Some(v) = security {
                settings.auto_apply_security = v;
            }
            if let Some(v) = threshold {
                settings.severity_threshold = v;
            }
            settings.updated_at = Utc::now();

            ctx.settings
                .upsert(&settings)
                .await
                .with_context(|| format!("Failed to store settings for {}", cluster))?;
            tracing::info!(cluster_id = %cluster, enabled = settings.enabled, "settings updated");

            output(&SettingsListOutput { settings: vec![settings], defaulted: false }, json_mode);
        }
    }
    Ok(())
}
