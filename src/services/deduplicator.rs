//! One remediation per target per cycle.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::models::{ProblemRecord, RemediationAction, ResolvedTarget};

/// A resolved remediation for one problem record, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub record: ProblemRecord,
    pub target: ResolvedTarget,
    pub action: RemediationAction,
    /// Records with the same target and the same action. They are resolved
    /// together with this one.
    pub merged_record_ids: Vec<Uuid>,
    /// Records on the same target that need a different action. They stay
    /// unresolved until a later cycle.
    pub deferred_record_ids: Vec<Uuid>,
}

impl PlannedAction {
    pub fn new(record: ProblemRecord, target: ResolvedTarget, action: RemediationAction) -> Self {
        Self {
            record,
            target,
            action,
            merged_record_ids: Vec::new(),
            deferred_record_ids: Vec::new(),
        }
    }

    /// The winning record followed by every merged one.
    pub fn source_record_ids(&self) -> Vec<Uuid> {
        std::iter::once(self.record.id)
            .chain(self.merged_record_ids.iter().copied())
            .collect()
    }
}

/// Collapse plans that share a target, keeping the first occurrence.
///
/// Input order is precedence order, so callers must feed specific diagnoses
/// (anomalies) before generic ones (raw pod observations). A losing plan is
/// merged only when its action matches the winner's; otherwise it is deferred.
pub fn dedupe(plans: Vec<PlannedAction>) -> Vec<PlannedAction> {
    let mut kept: Vec<PlannedAction> = Vec::with_capacity(plans.len());
    let mut index_by_target: HashMap<(String, String), usize> = HashMap::new();

    for plan in plans {
        let key = plan.target.dedup_key();
        match index_by_target.get(&key) {
            Some(&winner) => {
                let winner = &mut kept[winner];
                if winner.action == plan.action {
                    tracing::debug!(
                        record_id = %plan.record.id,
                        winner_id = %winner.record.id,
                        target = %plan.target,
                        "merged duplicate remediation"
                    );
                    winner.merged_record_ids.push(plan.record.id);
                    winner.merged_record_ids.extend(plan.merged_record_ids);
                } else {
                    tracing::debug!(
                        record_id = %plan.record.id,
                        winner_id = %winner.record.id,
                        target = %plan.target,
                        action = %plan.action.action_type,
                        "target already remediated this cycle, deferring record"
                    );
                    winner.deferred_record_ids.push(plan.record.id);
                    winner.deferred_record_ids.extend(plan.merged_record_ids);
                }
                winner.deferred_record_ids.extend(plan.deferred_record_ids);
            }
            None => {
                index_by_target.insert(key, kept.len());
                kept.push(plan);
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        ActionType, AnomalyDetail, PodObservationDetail, ProblemDetail, SeverityLevel,
    };

    fn plan(kind: &str, detail: ProblemDetail, target: ResolvedTarget, action: ActionType) -> PlannedAction {
        let record = ProblemRecord::new("cluster-a", SeverityLevel::High, kind, detail);
        PlannedAction::new(record, target, RemediationAction::new(action))
    }

    #[test]
    fn test_first_occurrence_wins_and_absorbs_duplicates() {
        let target = ResolvedTarget::pod("prod", "api-7d8f9c-x2x").unwrap();
        let anomaly = plan(
            "crash_loop_backoff",
            ProblemDetail::Anomaly(AnomalyDetail::default()),
            target.clone(),
            ActionType::RestartPod,
        );
        let observation = plan(
            "high_restart_count",
            ProblemDetail::PodObservation(PodObservationDetail::default()),
            target,
            ActionType::RestartPod,
        );
        let other = plan(
            "crash_loop_backoff",
            ProblemDetail::Anomaly(AnomalyDetail::default()),
            ResolvedTarget::pod("prod", "web-5f6d7-abcde").unwrap(),
            ActionType::RestartPod,
        );
        let observation_id = observation.record.id;

        let deduped = dedupe(vec![anomaly.clone(), observation, other.clone()]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].record.id, anomaly.record.id);
        assert_eq!(deduped[0].source_record_ids(), vec![anomaly.record.id, observation_id]);
        assert!(deduped[0].deferred_record_ids.is_empty());
        assert_eq!(deduped[1].record.id, other.record.id);
    }

    #[test]
    fn test_different_action_on_same_target_is_deferred() {
        let target = ResolvedTarget::pod("prod", "api-7d8f9c-x2x").unwrap();
        let anomaly = plan(
            "oom_killed",
            ProblemDetail::Anomaly(AnomalyDetail::default()),
            target.clone(),
            ActionType::UpdateDeploymentResources,
        );
        let observation = plan(
            "high_restart_count",
            ProblemDetail::PodObservation(PodObservationDetail::default()),
            target,
            ActionType::RestartPod,
        );
        let observation_id = observation.record.id;

        let deduped = dedupe(vec![anomaly.clone(), observation]);

        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].action.action_type, ActionType::UpdateDeploymentResources);
        assert_eq!(deduped[0].source_record_ids(), vec![anomaly.record.id]);
        assert_eq!(deduped[0].deferred_record_ids, vec![observation_id]);
    }

    #[test]
    fn test_same_pod_in_other_namespace_is_distinct() {
        let a = plan(
            "crash_loop_backoff",
            ProblemDetail::Anomaly(AnomalyDetail::default()),
            ResolvedTarget::pod("prod", "api-1").unwrap(),
            ActionType::RestartPod,
        );
        let b = plan(
            "crash_loop_backoff",
            ProblemDetail::Anomaly(AnomalyDetail::default()),
            ResolvedTarget::pod("staging", "api-1").unwrap(),
            ActionType::RestartPod,
        );

        assert_eq!(dedupe(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let target = ResolvedTarget::pod("prod", "api-1").unwrap();
        let plans: Vec<_> = (0..3)
            .map(|_| {
                plan(
                    "crash_loop_backoff",
                    ProblemDetail::Anomaly(AnomalyDetail::default()),
                    target.clone(),
                    ActionType::RestartPod,
                )
            })
            .collect();

        let once = dedupe(plans);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once[0].merged_record_ids.len(), 2);
    }
}
