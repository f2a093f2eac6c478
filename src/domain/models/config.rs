use serde::{Deserialize, Serialize};

/// Main configuration structure for the auto-heal engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reconciliation cycle configuration
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Retry policy for failed commands
    #[serde(default)]
    pub retry: RetryConfig,

    /// Notification delivery
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Upper bound for any single database call, in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_database_path() -> String {
    ".autoheal/autoheal.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_operation_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for sqlx.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Reconciliation cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcileConfig {
    /// Seconds between reconciliation cycles
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,

    /// Newest N unresolved records fetched per source per cycle
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    /// Per-cluster lease lifetime; must outlast a cycle
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Upper bound for `scale_deployment` replica counts
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// Fall back to `restart_pod` for unrecognized kinds without a suggested action
    #[serde(default = "default_true")]
    pub restart_unrecognized_kinds: bool,
}

const fn default_reconcile_interval_secs() -> u64 {
    60
}

const fn default_fetch_limit() -> u32 {
    50
}

const fn default_lease_ttl_secs() -> u64 {
    300
}

const fn default_max_replicas() -> u32 {
    10
}

const fn default_true() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval_secs(),
            fetch_limit: default_fetch_limit(),
            lease_ttl_secs: default_lease_ttl_secs(),
            max_replicas: default_max_replicas(),
            restart_unrecognized_kinds: default_true(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts per command
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Seconds between retry scheduler passes
    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,

    /// Seconds an executor may hold a leased command before it counts as unacknowledged
    #[serde(default = "default_executor_lease_secs")]
    pub executor_lease_secs: u64,

    /// Commands examined per retry pass
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    10_000
}

const fn default_max_backoff_ms() -> u64 {
    300_000
}

const fn default_retry_interval_secs() -> u64 {
    15
}

const fn default_executor_lease_secs() -> u64 {
    600
}

const fn default_batch_size() -> u32 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            interval_secs: default_retry_interval_secs(),
            executor_lease_secs: default_executor_lease_secs(),
            batch_size: default_batch_size(),
        }
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    /// Optional webhook receiving every notification as JSON
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

const fn default_webhook_timeout_ms() -> u64 {
    3_000
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}
