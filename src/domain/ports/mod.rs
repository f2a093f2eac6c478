//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - ProblemRepository: detector feed of problem records
//! - SettingsRepository: per-cluster auto-heal policy
//! - CommandQueue: durable hand-off to the executor agent
//! - ActionLogRepository: remediation audit trail
//! - ClusterLease: per-cluster serialization of reconciliation
//! - NotificationSink: operator notifications

pub mod action_log_repository;
pub mod cluster_lease;
pub mod command_queue;
pub mod notification_sink;
pub mod problem_repository;
pub mod settings_repository;

pub use action_log_repository::{ActionLogFilter, ActionLogRepository};
pub use cluster_lease::ClusterLease;
pub use command_queue::{CommandFilter, CommandQueue, EnqueueOutcome};
pub use notification_sink::NotificationSink;
pub use problem_repository::{ProblemFilter, ProblemRepository};
pub use settings_repository::SettingsRepository;
