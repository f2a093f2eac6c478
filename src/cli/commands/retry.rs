//! `autoheal retry`: one retry pass over the command queue.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};

#[derive(Args, Debug)]
pub struct RetryArgs {}

#[derive(Debug, Serialize)]
pub struct RetryOutput {
    pub examined: usize,
    pub rearmed: usize,
    pub skipped: usize,
    pub exhausted_clusters: Vec<String>,
}

impl CommandOutput for RetryOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Retry pass: {} due, {} re-armed, {} changed concurrently",
            self.examined, self.rearmed, self.skipped
        )];
        if !self.exhausted_clusters.is_empty() {
            lines.push(format!(
                "Exhausted commands awaiting report on: {}",
                self.exhausted_clusters.join(", ")
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(_args: RetryArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let report = ctx.retry_scheduler().run_once().await.context("Retry pass failed")?;

    let out = RetryOutput {
        examined: report.examined,
        rearmed: report.rearmed,
        skipped: report.skipped,
        exhausted_clusters: report.exhausted_clusters.into_iter().collect(),
    };
    output(&out, json_mode);
    Ok(())
}
