//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    command::CommandArgs, daemon::DaemonArgs, init::InitArgs, log::LogArgs,
    notification::NotificationArgs, problem::ProblemArgs, reconcile::ReconcileArgs,
    retry::RetryArgs, settings::SettingsArgs,
};
use context::AppContext;

#[derive(Parser, Debug)]
#[command(name = "autoheal")]
#[command(about = "Autoheal - Kubernetes auto-heal reconciliation engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .autoheal/config.yaml)
    #[arg(long, global = true, env = "AUTOHEAL_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration and database
    Init(InitArgs),

    /// Run the reconciliation daemon
    Daemon(DaemonArgs),

    /// Run one reconciliation cycle for a cluster
    Reconcile(ReconcileArgs),

    /// Run one retry pass over failed commands
    Retry(RetryArgs),

    /// Per-cluster auto-heal settings
    Settings(SettingsArgs),

    /// Problem records from detectors
    Problem(ProblemArgs),

    /// Remediation command queue
    Command(CommandArgs),

    /// Remediation audit log
    Log(LogArgs),

    /// Operator notification history
    Notification(NotificationArgs),
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    let command = match cli.command {
        Commands::Init(args) => return commands::init::execute(args, json).await,
        other => other,
    };

    let config = context::load_config(cli.config.as_deref())?;
    let ctx = AppContext::open(config).await?;

    let result = match command {
        Commands::Init(_) => Ok(()),
        Commands::Daemon(args) => commands::daemon::execute(args, &ctx, json).await,
        Commands::Reconcile(args) => commands::reconcile::execute(args, &ctx, json).await,
        Commands::Retry(args) => commands::retry::execute(args, &ctx, json).await,
        Commands::Settings(args) => commands::settings::execute(args, &ctx, json).await,
        Commands::Problem(args) => commands::problem::execute(args, &ctx, json).await,
        Commands::Command(args) => commands::command::execute(args, &ctx, json).await,
        Commands::Log(args) => commands::log::execute(args, &ctx, json).await,
        Commands::Notification(args) => commands::notification::execute(args, &ctx, json).await,
    };

    ctx.pool.close().await;
    result
}

/// Print an error in the selected output mode and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let chain: Vec<String> = err.chain().skip(1).map(|e| e.to_string()).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {:#}", err);
    }
    std::process::exit(1);
}
