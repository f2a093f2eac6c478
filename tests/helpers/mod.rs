//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod database;

use autoheal::cli::context::AppContext;
use autoheal::domain::models::{
    AnomalyDetail, AutoHealSettings, ClassifierHints, Config, PodObservationDetail, ProblemDetail,
    ProblemRecord, SeverityLevel, ThreatDetail,
};
use autoheal::domain::ports::{ProblemRepository, SettingsRepository};

pub const CLUSTER: &str = "prod-east";

/// Fresh engine wired the way the CLI wires it, on an in-memory database.
pub async fn engine() -> AppContext {
    engine_with_config(Config::default()).await
}

pub async fn engine_with_config(config: Config) -> AppContext {
    let pool = database::setup_test_db().await;
    AppContext::with_pool(config, pool)
}

/// Settings with the master switch on.
pub fn enabled_settings(anomalies: bool, security: bool, threshold: SeverityLevel) -> AutoHealSettings {
    let mut settings = AutoHealSettings::disabled(CLUSTER);
    settings.enabled = true;
    settings.auto_apply_anomalies = anomalies;
    settings.auto_apply_security = security;
    settings.severity_threshold = threshold;
    settings
}

pub async fn store_settings(ctx: &AppContext, settings: AutoHealSettings) {
    ctx.settings.upsert(&settings).await.expect("failed to store settings");
}

/// Anomaly naming its affected pods as `namespace/pod`.
pub fn anomaly(kind: &str, severity: SeverityLevel, pods: &[&str]) -> ProblemRecord {
    let detail = AnomalyDetail {
        hints: ClassifierHints {
            affected_pods: pods.iter().map(|p| (*p).to_string()).collect(),
            ..ClassifierHints::default()
        },
        ..AnomalyDetail::default()
    };
    ProblemRecord::new(CLUSTER, severity, kind, ProblemDetail::Anomaly(detail))
}

pub fn threat(kind: &str, severity: SeverityLevel, pods: &[&str]) -> ProblemRecord {
    let detail = ThreatDetail {
        hints: ClassifierHints {
            affected_pods: pods.iter().map(|p| (*p).to_string()).collect(),
            ..ClassifierHints::default()
        },
        ..ThreatDetail::default()
    };
    ProblemRecord::new(CLUSTER, severity, kind, ProblemDetail::SecurityThreat(detail))
}

pub fn pod_observation(namespace: &str, pod: &str, reason: &str) -> ProblemRecord {
    let detail = PodObservationDetail {
        pod_name: pod.to_string(),
        namespace: namespace.to_string(),
        reason: Some(reason.to_string()),
        restart_count: 7,
        ..PodObservationDetail::default()
    };
    ProblemRecord::new(CLUSTER, SeverityLevel::High, "crash_loop_backoff", ProblemDetail::PodObservation(detail))
}

pub async fn store(ctx: &AppContext, record: &ProblemRecord) {
    ctx.problems.insert(record).await.expect("failed to store problem record");
}
