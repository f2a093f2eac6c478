//! Reconciliation cycle for one cluster.
//!
//! Policy gate, target and action resolution, dedupe, dispatch, report. The
//! cycle holds the cluster lease for its whole duration so two cycles never
//! interleave writes for the same cluster. The lease is renewed before every
//! dispatch and the cycle ends early if it was lost.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ActionLogEntry, AutoHealSettings, Config, Notification, ProblemRecord, ProblemSource,
};
use crate::domain::ports::{
    ActionLogRepository, ClusterLease, CommandQueue, NotificationSink, ProblemRepository,
    SettingsRepository,
};
use crate::services::action_resolver::{ActionResolution, ActionResolver, ActionResolverConfig};
use crate::services::bounded::bounded;
use crate::services::command_dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::services::deduplicator::{dedupe, PlannedAction};
use crate::services::severity_policy::{self, PolicyDecision};
use crate::services::{run_reporter, target_resolver};

/// Sources in dispatch precedence order.
const SOURCES_BY_PRECEDENCE: [ProblemSource; 3] = [
    ProblemSource::Anomaly,
    ProblemSource::SecurityThreat,
    ProblemSource::PodObservation,
];

const MAX_LEASE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub fetch_limit: u32,
    pub lease_ttl: chrono::Duration,
    pub operation_timeout: Duration,
    pub max_retries: u32,
    pub resolver: ActionResolverConfig,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReconcilerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_limit: config.reconcile.fetch_limit.max(1),
            lease_ttl: chrono::Duration::seconds(config.reconcile.lease_ttl_secs.min(MAX_LEASE_TTL_SECS) as i64),
            operation_timeout: Duration::from_millis(config.database.operation_timeout_ms),
            max_retries: config.retry.max_retries,
            resolver: ActionResolverConfig::from(&config.reconcile),
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Completed,
    /// Another cycle holds the cluster lease.
    Busy,
    /// Stop was requested between dispatches; already dispatched actions stand.
    Cancelled,
    /// The cluster lease could not be renewed mid-cycle.
    LeaseLost,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::LeaseLost => "lease_lost",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cluster_id: String,
    pub status: CycleStatus,
    pub examined: usize,
    pub denied: usize,
    pub skipped: usize,
    pub merged: usize,
    /// Records left unresolved because their target was already remediated.
    pub deferred: usize,
    pub outcomes: Vec<DispatchOutcome>,
    pub exhausted: usize,
    pub notification: Option<Notification>,
}

impl CycleReport {
    fn new(cluster_id: &str, status: CycleStatus) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            status,
            examined: 0,
            denied: 0,
            skipped: 0,
            merged: 0,
            deferred: 0,
            outcomes: Vec::new(),
            exhausted: 0,
            notification: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct Reconciler {
    problems: Arc<dyn ProblemRepository>,
    settings: Arc<dyn SettingsRepository>,
    queue: Arc<dyn CommandQueue>,
    action_logs: Arc<dyn ActionLogRepository>,
    leases: Arc<dyn ClusterLease>,
    sink: Arc<dyn NotificationSink>,
    dispatcher: CommandDispatcher,
    resolver: ActionResolver,
    options: ReconcilerOptions,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl Reconciler {
    pub fn new(
        problems: Arc<dyn ProblemRepository>,
        settings: Arc<dyn SettingsRepository>,
        queue: Arc<dyn CommandQueue>,
        action_logs: Arc<dyn ActionLogRepository>,
        leases: Arc<dyn ClusterLease>,
        sink: Arc<dyn NotificationSink>,
        options: ReconcilerOptions,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(
            queue.clone(),
            action_logs.clone(),
            problems.clone(),
            options.max_retries,
            options.operation_timeout,
        );
        Self {
            problems,
            settings,
            queue,
            action_logs,
            leases,
            sink,
            dispatcher,
            resolver: ActionResolver::new(options.resolver.clone()),
            options,
            stop_flag: None,
        }
    }

    /// Cancel cycles between dispatches once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Clusters with unresolved records or unreported exhausted commands.
    pub async fn pending_clusters(&self) -> DomainResult<Vec<String>> {
        let timeout = self.options.operation_timeout;
        let mut clusters: BTreeSet<String> =
            bounded(timeout, "clusters_with_unresolved", self.problems.clusters_with_unresolved())
                .await?
                .into_iter()
                .collect();

        let exhausted = bounded(
            timeout,
            "list_exhausted_unreported",
            self.queue.list_exhausted_unreported(None, Utc::now()),
        )
        .await?;
        clusters.extend(exhausted.into_iter().map(|c| c.cluster_id));

        Ok(clusters.into_iter().collect())
    }

    /// Run one reconciliation cycle for `cluster_id`.
    ///
    /// `force` bypasses the severity policy. Timeouts abort the cycle and are
    /// returned; every other per-record failure is isolated.
    #[instrument(skip(self), fields(cycle_id = tracing::field::Empty))]
    pub async fn reconcile(&self, cluster_id: &str, force: bool) -> DomainResult<CycleReport> {
        let timeout = self.options.operation_timeout;
        let holder = Uuid::new_v4().to_string();
        tracing::Span::current().record("cycle_id", holder.as_str());

        let acquired = bounded(
            timeout,
            "acquire_cluster_lease",
            self.leases.try_acquire(cluster_id, &holder, self.options.lease_ttl),
        )
        .await?;
        if !acquired {
            tracing::info!("cluster is being reconciled elsewhere, skipping cycle");
            return Ok(CycleReport::new(cluster_id, CycleStatus::Busy));
        }

        let result = self.run_cycle(cluster_id, &holder, force).await;

        if let Err(err) = bounded(timeout, "release_cluster_lease", self.leases.release(cluster_id, &holder)).await {
            tracing::warn!(error = %err, "failed to release cluster lease, it will expire on its own");
        }

        match &result {
            Ok(report) => tracing::info!(
                status = report.status.as_str(),
                examined = report.examined,
                denied = report.denied,
                skipped = report.skipped,
                merged = report.merged,
                deferred = report.deferred,
                succeeded = report.succeeded(),
                failed = report.failed(),
                exhausted = report.exhausted,
                "reconciliation cycle finished"
            ),
            Err(err) => tracing::error!(error = %err, "reconciliation cycle aborted"),
        }
        result
    }

    async fn run_cycle(&self, cluster_id: &str, holder: &str, force: bool) -> DomainResult<CycleReport> {
        let timeout = self.options.operation_timeout;
        let mut report = CycleReport::new(cluster_id, CycleStatus::Completed);

        let settings = bounded(timeout, "get_settings", self.settings.get(cluster_id)).await?;

        let mut plans = Vec::new();
        for source in SOURCES_BY_PRECEDENCE {
            let records = bounded(
                timeout,
                "fetch_unresolved",
                self.problems.fetch_unresolved(cluster_id, source, self.options.fetch_limit),
            )
            .await?;

            for record in records {
                report.examined += 1;
                if !self.admit(&record, settings.as_ref(), force) {
                    report.denied += 1;
                    continue;
                }
                match self.plan(record).await? {
                    Some(plan) => plans.push(plan),
                    None => report.skipped += 1,
                }
            }
        }

        let planned = plans.len();
        let plans = dedupe(plans);
        report.deferred = plans.iter().map(|p| p.deferred_record_ids.len()).sum();
        report.merged = planned - plans.len() - report.deferred;

        for plan in &plans {
            if self.stop_requested() {
                tracing::info!(remaining = plans.len() - report.outcomes.len(), "stop requested, cancelling cycle");
                report.status = CycleStatus::Cancelled;
                break;
            }
            if !self.renew_lease(cluster_id, holder).await? {
                tracing::warn!(remaining = plans.len() - report.outcomes.len(), "cluster lease lost, ending cycle");
                report.status = CycleStatus::LeaseLost;
                break;
            }
            report.outcomes.push(self.dispatcher.dispatch(plan).await?);
        }

        // Exhaustion reporting belongs to whoever holds the lease now.
        if report.status == CycleStatus::LeaseLost {
            if let Some(notification) = run_reporter::report(cluster_id, &report.outcomes, &[]) {
                if let Err(err) = bounded(timeout, "send_notification", self.sink.send(&notification)).await {
                    tracing::warn!(error = %err, "failed to deliver cycle notification");
                }
                report.notification = Some(notification);
            }
            return Ok(report);
        }

        let exhausted = bounded(
            timeout,
            "list_exhausted_unreported",
            self.queue.list_exhausted_unreported(Some(cluster_id), Utc::now()),
        )
        .await?;
        report.exhausted = exhausted.len();

        if let Some(notification) = run_reporter::report(cluster_id, &report.outcomes, &exhausted) {
            match bounded(timeout, "send_notification", self.sink.send(&notification)).await {
                Ok(()) => {
                    if !exhausted.is_empty() {
                        let ids: Vec<Uuid> = exhausted.iter().map(|c| c.id).collect();
                        bounded(
                            timeout,
                            "mark_exhausted_reported",
                            self.queue.mark_exhausted_reported(&ids, Utc::now()),
                        )
                        .await?;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to deliver cycle notification");
                }
            }
            report.notification = Some(notification);
        }

        Ok(report)
    }

    /// Extend the cluster lease. `false` means another holder took it over.
    async fn renew_lease(&self, cluster_id: &str, holder: &str) -> DomainResult<bool> {
        let renewal = self.leases.try_acquire(cluster_id, holder, self.options.lease_ttl);
        match bounded(self.options.operation_timeout, "renew_cluster_lease", renewal).await {
            Ok(renewed) => Ok(renewed),
            Err(err) if err.is_timeout() => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "failed to renew cluster lease");
                Ok(false)
            }
        }
    }

    fn admit(&self, record: &ProblemRecord, settings: Option<&AutoHealSettings>, force: bool) -> bool {
        match severity_policy::evaluate(record.severity, record.source(), settings, force) {
            PolicyDecision::Allowed { forced } => {
                if forced {
                    tracing::debug!(record_id = %record.id, "policy bypassed by force");
                }
                true
            }
            PolicyDecision::Denied(reason) => {
                tracing::debug!(record_id = %record.id, kind = %record.kind, %reason, "record denied by policy");
                false
            }
        }
    }

    /// Resolve target and action, or log a skip.
    async fn plan(&self, record: ProblemRecord) -> DomainResult<Option<PlannedAction>> {
        let Some(target) = target_resolver::resolve(&record) else {
            self.record_skip(&record, target_resolver::NO_TARGET_REASON).await?;
            return Ok(None);
        };

        match self.resolver.resolve(&record.kind, &target, &record.detail) {
            ActionResolution::Action(action) => Ok(Some(PlannedAction::new(record, target, action))),
            ActionResolution::Skip(reason) => {
                self.record_skip(&record, &reason).await?;
                Ok(None)
            }
        }
    }

    /// Append a Skipped entry unless the record already has one.
    async fn record_skip(&self, record: &ProblemRecord, reason: &str) -> DomainResult<()> {
        let timeout = self.options.operation_timeout;

        let already = match bounded(timeout, "has_skip_for", self.action_logs.has_skip_for(record.id)).await {
            Ok(already) => already,
            Err(err) if err.is_timeout() => return Err(err),
            Err(err) => {
                tracing::warn!(record_id = %record.id, error = %err, "failed to check earlier skips");
                false
            }
        };
        if already {
            tracing::debug!(record_id = %record.id, reason, "record still untargetable, skip already logged");
            return Ok(());
        }

        tracing::info!(record_id = %record.id, kind = %record.kind, reason, "skipping record");
        let entry = ActionLogEntry::skipped(record, None, reason);
        match bounded(timeout, "insert_skip_entry", self.action_logs.insert(&entry)).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_timeout() => Err(err),
            Err(err) => {
                tracing::warn!(record_id = %record.id, error = %err, "failed to log skipped record");
                Ok(())
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
