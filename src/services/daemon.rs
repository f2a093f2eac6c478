//! Auto-heal background daemon.
//!
//! Runs two independent periodic tasks:
//! - Reconciliation of every cluster with pending work, clusters in parallel
//! - Retry passes over the command queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::domain::errors::DomainResult;
use crate::domain::models::Config;
use crate::services::reconciler::{CycleReport, CycleStatus, Reconciler};
use crate::services::retry_scheduler::{RetryPassReport, RetryScheduler};

/// Configuration for the auto-heal daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interval between reconciliation rounds.
    pub reconcile_interval: Duration,
    /// Interval between retry passes.
    pub retry_interval: Duration,
    /// Whether to run both tasks immediately on startup.
    pub run_on_startup: bool,
    /// Consecutive infrastructure failures before the daemon gives up.
    pub max_consecutive_failures: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            retry_interval: Duration::from_secs(15),
            run_on_startup: true,
            max_consecutive_failures: 5,
        }
    }
}

impl DaemonConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reconcile_interval: Duration::from_secs(config.reconcile.interval_secs.max(1)),
            retry_interval: Duration::from_secs(config.retry.interval_secs.max(1)),
            ..Default::default()
        }
    }

    /// Same interval for both tasks.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            reconcile_interval: interval,
            retry_interval: interval,
            ..Default::default()
        }
    }
}

/// Event emitted by the daemon.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    Started,
    CycleCompleted {
        cluster_id: String,
        status: CycleStatus,
        dispatched: usize,
        failed: usize,
        exhausted: usize,
    },
    CycleFailed {
        cluster_id: String,
        error: String,
    },
    RetryPassCompleted {
        report: RetryPassReport,
        duration_ms: u64,
    },
    RetryPassFailed {
        error: String,
    },
    Stopped {
        reason: StopReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    TooManyFailures,
}

#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub reconcile_rounds: u64,
    pub cycles_completed: u64,
    pub cycles_busy: u64,
    pub cycles_failed: u64,
    pub commands_dispatched: u64,
    pub retry_passes: u64,
    pub retry_passes_failed: u64,
    pub commands_rearmed: u64,
    pub last_reconcile: Option<Instant>,
    pub last_retry: Option<Instant>,
}

/// Handle to control a running daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    status: Arc<RwLock<DaemonStatus>>,
}

impl DaemonHandle {
    /// Request the daemon to stop. In-flight cycles stop between dispatches.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }
}

pub struct AutoHealDaemon {
    reconciler: Arc<Reconciler>,
    scheduler: Arc<RetryScheduler>,
    config: DaemonConfig,
    status: Arc<RwLock<DaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl AutoHealDaemon {
    pub fn new(reconciler: Reconciler, scheduler: RetryScheduler, config: DaemonConfig) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        Self {
            reconciler: Arc::new(reconciler.with_stop_flag(stop_flag.clone())),
            scheduler: Arc::new(scheduler),
            config,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            stop_flag,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            stop_flag: self.stop_flag.clone(),
            shutdown: self.shutdown.clone(),
            status: self.status.clone(),
        }
    }

    /// Spawn the daemon loop, returning a channel for events.
    pub fn run(self) -> mpsc::Receiver<DaemonEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<DaemonEvent>) {
        self.status.write().await.running = true;
        let _ = tx.send(DaemonEvent::Started).await;
        tracing::info!(
            reconcile_interval_secs = self.config.reconcile_interval.as_secs(),
            retry_interval_secs = self.config.retry_interval.as_secs(),
            "auto-heal daemon started"
        );

        let mut reconcile_timer = interval(self.config.reconcile_interval);
        let mut retry_timer = interval(self.config.retry_interval);
        reconcile_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        retry_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick of a tokio interval completes immediately.
        if !self.config.run_on_startup {
            reconcile_timer.tick().await;
            retry_timer.tick().await;
        }

        let mut consecutive_failures = 0u32;
        let reason = loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                break StopReason::Requested;
            }

            let healthy = tokio::select! {
                _ = self.shutdown.notified() => break StopReason::Requested,
                _ = retry_timer.tick() => self.retry_round(&tx).await,
                _ = reconcile_timer.tick() => self.reconcile_round(&tx).await,
            };

            if healthy {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                if consecutive_failures >= self.config.max_consecutive_failures {
                    tracing::error!(consecutive_failures, "too many consecutive failures, stopping daemon");
                    break StopReason::TooManyFailures;
                }
            }
        };

        self.status.write().await.running = false;
        tracing::info!(reason = ?reason, "auto-heal daemon stopped");
        let _ = tx.send(DaemonEvent::Stopped { reason }).await;
    }

    /// One reconciliation round over every cluster with pending work.
    /// Returns false when the cluster list could not be read.
    async fn reconcile_round(&self, tx: &mpsc::Sender<DaemonEvent>) -> bool {
        let clusters = match self.reconciler.pending_clusters().await {
            Ok(clusters) => clusters,
            Err(err) => {
                tracing::error!(error = %err, "failed to list clusters with pending work");
                return false;
            }
        };

        let results = self.reconcile_clusters(&clusters).await;

        let mut status = self.status.write().await;
        status.reconcile_rounds += 1;
        status.last_reconcile = Some(Instant::now());
        for (cluster_id, result) in clusters.into_iter().zip(results) {
            let event = match result {
                Ok(report) => {
                    match report.status {
                        CycleStatus::Busy => status.cycles_busy += 1,
                        CycleStatus::Completed | CycleStatus::Cancelled | CycleStatus::LeaseLost => {
                            status.cycles_completed += 1
                        }
                    }
                    status.commands_dispatched += report.succeeded() as u64;
                    DaemonEvent::CycleCompleted {
                        cluster_id,
                        status: report.status,
                        dispatched: report.succeeded(),
                        failed: report.failed(),
                        exhausted: report.exhausted,
                    }
                }
                Err(err) => {
                    status.cycles_failed += 1;
                    DaemonEvent::CycleFailed { cluster_id, error: err.to_string() }
                }
            };
            let _ = tx.try_send(event);
        }
        true
    }

    /// Reconcile `clusters` concurrently; one cycle per cluster.
    pub async fn reconcile_clusters(&self, clusters: &[String]) -> Vec<DomainResult<CycleReport>> {
        join_all(clusters.iter().map(|cluster_id| self.reconciler.reconcile(cluster_id, false))).await
    }

    async fn retry_round(&self, tx: &mpsc::Sender<DaemonEvent>) -> bool {
        let start = Instant::now();
        let result = self.scheduler.run_once().await;

        let mut status = self.status.write().await;
        status.retry_passes += 1;
        status.last_retry = Some(Instant::now());
        match result {
            Ok(report) => {
                status.commands_rearmed += report.rearmed as u64;
                let _ = tx.try_send(DaemonEvent::RetryPassCompleted {
                    report,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                true
            }
            Err(err) => {
                status.retry_passes_failed += 1;
                tracing::error!(error = %err, "retry pass failed");
                let _ = tx.try_send(DaemonEvent::RetryPassFailed { error: err.to_string() });
                false
            }
        }
    }

    /// Run one reconciliation round and one retry pass without scheduling.
    pub async fn run_once(&self) -> DomainResult<(Vec<CycleReport>, RetryPassReport)> {
        let retry = self.scheduler.run_once().await?;
        let clusters = self.reconciler.pending_clusters().await?;
        let reports = self
            .reconcile_clusters(&clusters)
            .await
            .into_iter()
            .collect::<DomainResult<Vec<_>>>()?;
        Ok((reports, retry))
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteActionLogRepository, SqliteClusterLease, SqliteCommandQueue,
        SqliteNotificationRepository, SqliteProblemRepository, SqliteSettingsRepository,
    };
    use crate::domain::models::{
        AnomalyDetail, AutoHealSettings, ClassifierHints, ProblemDetail, ProblemRecord, SeverityLevel,
    };
    use crate::domain::ports::{ProblemRepository, SettingsRepository};
    use crate::services::reconciler::ReconcilerOptions;
    use crate::services::retry_scheduler::RetryPolicy;

    async fn daemon(config: DaemonConfig) -> (AutoHealDaemon, Arc<SqliteProblemRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let problems = Arc::new(SqliteProblemRepository::new(pool.clone()));
        let settings = Arc::new(SqliteSettingsRepository::new(pool.clone()));
        let queue = Arc::new(SqliteCommandQueue::new(pool.clone()));

        for cluster in ["cluster-a", "cluster-b"] {
            let mut s = AutoHealSettings::disabled(cluster);
            s.enabled = true;
            s.auto_apply_anomalies = true;
            settings.upsert(&s).await.unwrap();
        }

        let reconciler = Reconciler::new(
            problems.clone(),
            settings,
            queue.clone(),
            Arc::new(SqliteActionLogRepository::new(pool.clone())),
            Arc::new(SqliteClusterLease::new(pool.clone())),
            Arc::new(SqliteNotificationRepository::new(pool)),
            ReconcilerOptions::default(),
        );
        let scheduler = RetryScheduler::new(queue, RetryPolicy::default(), 100, Duration::from_secs(5));
        (AutoHealDaemon::new(reconciler, scheduler, config), problems)
    }

    fn crash_loop(cluster: &str, pod: &str) -> ProblemRecord {
        let detail = ProblemDetail::Anomaly(AnomalyDetail {
            hints: ClassifierHints {
                affected_pods: vec![format!("prod/{}", pod)],
                ..Default::default()
            },
            ..Default::default()
        });
        ProblemRecord::new(cluster, SeverityLevel::Critical, "crash_loop_backoff", detail)
    }

    #[test]
    fn test_config_default() {
        let config = DaemonConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.retry_interval, Duration::from_secs(15));
        assert!(config.run_on_startup);
    }

    #[test]
    fn test_config_from_app_config() {
        let mut app = Config::default();
        app.reconcile.interval_secs = 0;
        app.retry.interval_secs = 5;

        let config = DaemonConfig::from_config(&app);
        assert_eq!(config.reconcile_interval, Duration::from_secs(1));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_once_reconciles_every_cluster() {
        let (daemon, problems) = daemon(DaemonConfig::default()).await;
        problems.insert(&crash_loop("cluster-a", "api-7d8f-abc")).await.unwrap();
        problems.insert(&crash_loop("cluster-b", "web-5f6d7-x2x")).await.unwrap();

        let (reports, retry) = daemon.run_once().await.unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.succeeded() == 1));
        assert_eq!(retry.examined, 0);
        assert!(problems.clusters_with_unresolved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let (daemon, problems) = daemon(DaemonConfig::with_interval(Duration::from_millis(50))).await;
        problems.insert(&crash_loop("cluster-a", "api-7d8f-abc")).await.unwrap();
        let handle = daemon.handle();

        let mut events = daemon.run();
        assert!(matches!(events.recv().await, Some(DaemonEvent::Started)));

        loop {
            match events.recv().await {
                Some(DaemonEvent::CycleCompleted { cluster_id, dispatched, .. }) => {
                    assert_eq!(cluster_id, "cluster-a");
                    assert_eq!(dispatched, 1);
                    break;
                }
                Some(_) => continue,
                None => panic!("daemon exited before reconciling"),
            }
        }

        handle.stop();
        let reason = loop {
            match events.recv().await {
                Some(DaemonEvent::Stopped { reason }) => break reason,
                Some(_) => continue,
                None => panic!("daemon exited without a stop event"),
            }
        };
        assert_eq!(reason, StopReason::Requested);
        assert!(!handle.status().await.running);
        assert!(handle.status().await.commands_dispatched >= 1);
    }
}
