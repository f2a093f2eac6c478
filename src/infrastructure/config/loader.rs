use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding project-local configuration and the default database.
pub const CONFIG_DIR: &str = ".autoheal";

/// Prefix of environment variable overrides, e.g. `AUTOHEAL_RETRY__MAX_RETRIES`.
pub const ENV_PREFIX: &str = "AUTOHEAL_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid {0}: must be greater than 0")]
    ZeroValue(&'static str),

    #[error("Invalid webhook_url: {0}. Must start with http:// or https://")]
    InvalidWebhookUrl(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .autoheal/config.yaml (project config, created by init)
    /// 3. .autoheal/local.yaml (local overrides, optional)
    /// 4. Environment variables (AUTOHEAL_* prefix, `__` between sections)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(None)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(explicit: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = match explicit {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment
                .merge(Yaml::file(format!("{CONFIG_DIR}/config.yaml")))
                .merge(Yaml::file(format!("{CONFIG_DIR}/local.yaml"))),
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }
        if config.database.operation_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("database.operation_timeout_ms"));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.reconcile.interval_secs == 0 {
            return Err(ConfigError::ZeroValue("reconcile.interval_secs"));
        }
        if config.reconcile.fetch_limit == 0 {
            return Err(ConfigError::ZeroValue("reconcile.fetch_limit"));
        }
        if config.reconcile.lease_ttl_secs == 0 {
            return Err(ConfigError::ZeroValue("reconcile.lease_ttl_secs"));
        }
        if config.reconcile.max_replicas == 0 {
            return Err(ConfigError::ZeroValue("reconcile.max_replicas"));
        }

        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }
        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }
        if config.retry.interval_secs == 0 {
            return Err(ConfigError::ZeroValue("retry.interval_secs"));
        }
        if config.retry.executor_lease_secs == 0 {
            return Err(ConfigError::ZeroValue("retry.executor_lease_secs"));
        }
        if config.retry.batch_size == 0 {
            return Err(ConfigError::ZeroValue("retry.batch_size"));
        }

        if let Some(url) = &config.notifications.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidWebhookUrl(url.clone()));
            }
        }
        if config.notifications.webhook_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("notifications.webhook_timeout_ms"));
        }

        Ok(())
    }
}
