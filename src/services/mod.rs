//! Application services: the reconciliation pipeline and its schedulers.

pub mod action_resolver;
pub mod bounded;
pub mod command_dispatcher;
pub mod daemon;
pub mod deduplicator;
pub mod reconciler;
pub mod retry_scheduler;
pub mod run_reporter;
pub mod severity_policy;
pub mod target_resolver;

pub use action_resolver::{ActionResolution, ActionResolver, ActionResolverConfig};
pub use command_dispatcher::{CommandDispatcher, DispatchOutcome};
pub use daemon::{AutoHealDaemon, DaemonConfig, DaemonEvent, DaemonHandle, DaemonStatus, StopReason};
pub use deduplicator::{dedupe, PlannedAction};
pub use reconciler::{CycleReport, CycleStatus, Reconciler, ReconcilerOptions};
pub use retry_scheduler::{RetryPassReport, RetryPolicy, RetryScheduler};
pub use severity_policy::{DenyReason, PolicyDecision};
