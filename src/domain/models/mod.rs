pub mod action;
pub mod action_log;
pub mod command;
pub mod config;
pub mod notification;
pub mod problem;
pub mod settings;
pub mod severity;
pub mod target;

pub use action::{ActionType, ProblemKind, RemediationAction};
pub use action_log::{ActionLogEntry, ActionLogOutcome, ActionLogStatus};
pub use command::{Command, CommandStatus};
pub use config::{
    Config, DatabaseConfig, LoggingConfig, NotificationConfig, ReconcileConfig, RetryConfig,
};
pub use notification::{Notification, NotificationSeverity};
pub use problem::{
    AnomalyDetail, AutoHealParams, ClassifierHints, PodObservationDetail, ProblemDetail,
    ProblemRecord, ProblemSource, ResourceSpec, ThreatDetail,
};
pub use settings::AutoHealSettings;
pub use severity::SeverityLevel;
pub use target::ResolvedTarget;
