//! `autoheal daemon`: run reconciliation and retries until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::services::{AutoHealDaemon, CycleStatus, DaemonConfig, DaemonEvent, StopReason};

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Run a single reconciliation round and retry pass, then exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Serialize)]
pub struct DaemonOutput {
    pub stop_reason: String,
    pub reconcile_rounds: u64,
    pub cycles_completed: u64,
    pub cycles_busy: u64,
    pub cycles_failed: u64,
    pub commands_dispatched: u64,
    pub retry_passes: u64,
    pub commands_rearmed: u64,
}

impl CommandOutput for DaemonOutput {
    fn to_human(&self) -> String {
        format!(
            "Daemon stopped ({}): {} rounds, {} cycles completed, {} busy, {} failed, \
             {} commands dispatched; {} retry passes re-armed {} commands",
            self.stop_reason,
            self.reconcile_rounds,
            self.cycles_completed,
            self.cycles_busy,
            self.cycles_failed,
            self.commands_dispatched,
            self.retry_passes,
            self.commands_rearmed
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: DaemonArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let daemon = AutoHealDaemon::new(
        ctx.reconciler()?,
        ctx.retry_scheduler(),
        DaemonConfig::from_config(&ctx.config),
    );

    if args.once {
        let (reports, retry) = daemon.run_once().await.context("Daemon round failed")?;
        let out = DaemonOutput {
            stop_reason: "once".to_string(),
            reconcile_rounds: 1,
            cycles_completed: reports.iter().filter(|r| r.status != CycleStatus::Busy).count() as u64,
            cycles_busy: reports.iter().filter(|r| r.status == CycleStatus::Busy).count() as u64,
            cycles_failed: 0,
            commands_dispatched: reports.iter().map(|r| r.succeeded() as u64).sum(),
            retry_passes: 1,
            commands_rearmed: retry.rearmed as u64,
        };
        output(&out, json_mode);
        return Ok(());
    }

    let handle = daemon.handle();
    let mut events = daemon.run();

    let reason = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, stopping daemon");
                handle.stop();
            }
            event = events.recv() => match event {
                Some(DaemonEvent::Stopped { reason }) => break reason,
                Some(DaemonEvent::CycleFailed { cluster_id, error }) => {
                    tracing::warn!(%cluster_id, %error, "cycle failed");
                }
                Some(_) => {}
                None => break StopReason::Requested,
            },
        }
    };

    let status = handle.status().await;
    let out = DaemonOutput {
        stop_reason: format!("{:?}", reason).to_lowercase(),
        reconcile_rounds: status.reconcile_rounds,
        cycles_completed: status.cycles_completed,
        cycles_busy: status.cycles_busy,
        cycles_failed: status.cycles_failed,
        commands_dispatched: status.commands_dispatched,
        retry_passes: status.retry_passes,
        commands_rearmed: status.commands_rearmed,
    };
    output(&out, json_mode);

    if reason == StopReason::TooManyFailures {
        anyhow::bail!("daemon stopped after too many consecutive failures");
    }
    Ok(())
}
