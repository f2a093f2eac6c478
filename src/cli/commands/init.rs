//! Implementation of the `autoheal init` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::initialize_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::loader::CONFIG_DIR;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub config_written: bool,
    pub database_path: PathBuf,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("\nWrote {}/config.yaml", CONFIG_DIR));
        }
        if self.success {
            lines.push(format!("Database ready at {}", self.database_path.display()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir().context("Failed to get current directory")?.join(&args.path)
    };

    let config_dir = target_path.join(CONFIG_DIR);
    let config_path = config_dir.join("config.yaml");
    fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    // The written config keeps the project-relative default path.
    let config = Config::default();
    let mut database = config.database.clone();
    database.path = target_path.join(&config.database.path).display().to_string();

    let config_written = if config_path.exists() && !args.force {
        false
    } else {
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize default configuration")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    };

    let pool = initialize_database(&database)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;

    let message = if config_written {
        "Project initialized successfully."
    } else {
        "Configuration already present, kept it (use --force to overwrite). Database migrations applied."
    };

    let out = InitOutput {
        success: true,
        message: message.to_string(),
        initialized_path: target_path,
        config_written,
        database_path: PathBuf::from(&database.path),
    };
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_writes_config_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let args = InitArgs { force: false, path: dir.path().to_path_buf() };

        execute(args, true).await.unwrap();

        let config_path = dir.path().join(CONFIG_DIR).join("config.yaml");
        assert!(config_path.exists());
        assert!(dir.path().join(Config::default().database.path).exists());

        let written: Config = serde_yaml::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        assert_eq!(written.database.path, Config::default().database.path);
    }

    #[tokio::test]
    async fn test_init_keeps_existing_config_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.yaml"), "retry:\n  max_retries: 9\n").unwrap();

        execute(InitArgs { force: false, path: dir.path().to_path_buf() }, true).await.unwrap();

        let content = std::fs::read_to_string(config_dir.join("config.yaml")).unwrap();
        assert!(content.contains("max_retries: 9"));
    }
}
