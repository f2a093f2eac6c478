//! Autoheal - Kubernetes auto-heal reconciliation engine
//!
//! Autoheal turns problem records raised by cluster detectors (anomalies,
//! security threats, pod observations) into remediation commands for an
//! in-cluster executor agent, under per-cluster policy, with retries and an
//! audit trail.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and port traits
//! - **Service Layer** (`services`): The reconciliation pipeline, retry scheduler and daemon
//! - **Adapters** (`adapters`): SQLite persistence and notification sinks
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ActionType, Command, CommandStatus, Config, ProblemRecord, ProblemSource, SeverityLevel,
};
pub use domain::ports::{
    ActionLogRepository, ClusterLease, CommandQueue, NotificationSink, ProblemRepository,
    SettingsRepository,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AutoHealDaemon, Reconciler, RetryScheduler};
