//! Wiring of configuration, storage and services for CLI commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::notifications::{FanoutNotificationSink, WebhookNotificationSink};
use crate::adapters::sqlite::{
    initialize_database, SqliteActionLogRepository, SqliteClusterLease, SqliteCommandQueue,
    SqliteNotificationRepository, SqliteProblemRepository, SqliteSettingsRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::NotificationSink;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{Reconciler, ReconcilerOptions, RetryPolicy, RetryScheduler};

/// Load configuration from `path` when given, otherwise from the project hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open database and adapters shared by every command.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub problems: Arc<SqliteProblemRepository>,
    pub settings: Arc<SqliteSettingsRepository>,
    pub queue: Arc<SqliteCommandQueue>,
    pub action_logs: Arc<SqliteActionLogRepository>,
    pub leases: Arc<SqliteClusterLease>,
    pub notifications: Arc<SqliteNotificationRepository>,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}. Run 'autoheal init' first.", config.database.path))?;
        Ok(Self::with_pool(config, pool))
    }

    pub fn with_pool(config: Config, pool: SqlitePool) -> Self {
        Self {
            problems: Arc::new(SqliteProblemRepository::new(pool.clone())),
            settings: Arc::new(SqliteSettingsRepository::new(pool.clone())),
            queue: Arc::new(SqliteCommandQueue::new(pool.clone())),
            action_logs: Arc::new(SqliteActionLogRepository::new(pool.clone())),
            leases: Arc::new(SqliteClusterLease::new(pool.clone())),
            notifications: Arc::new(SqliteNotificationRepository::new(pool.clone())),
            config,
            pool,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.database.operation_timeout_ms)
    }

    /// Notification history in SQLite, plus the webhook when configured.
    pub fn notification_sink(&self) -> Result<Arc<dyn NotificationSink>> {
        let mut sink = FanoutNotificationSink::new().with_sink(self.notifications.clone());

        if let Some(url) = &self.config.notifications.webhook_url {
            let timeout = Duration::from_millis(self.config.notifications.webhook_timeout_ms);
            let webhook = WebhookNotificationSink::new(url.clone(), timeout)
                .context("Failed to configure webhook notification sink")?;
            sink = sink.with_sink(Arc::new(webhook));
        }

        Ok(Arc::new(sink))
    }

    pub fn reconciler(&self) -> Result<Reconciler> {
        Ok(Reconciler::new(
            self.problems.clone(),
            self.settings.clone(),
            self.queue.clone(),
            self.action_logs.clone(),
            self.leases.clone(),
            self.notification_sink()?,
            ReconcilerOptions::from_config(&self.config),
        ))
    }

    pub fn retry_scheduler(&self) -> RetryScheduler {
        RetryScheduler::new(
            self.queue.clone(),
            RetryPolicy::from(&self.config.retry),
            self.config.retry.batch_size,
            self.operation_timeout(),
        )
    }
}
