//! Target resolution for problem records.
//!
//! Each detector variant carries its target in a different place. Anomalies
//! and threats go through a fallback chain over the classifier hints, pod
//! observations name their pod directly.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::models::{ClassifierHints, ProblemDetail, ProblemRecord, ResolvedTarget};

/// Skip reason recorded when no fallback yields a target.
pub const NO_TARGET_REASON: &str = "no target identified";

const DEFAULT_NAMESPACE: &str = "default";

/// The word "pod" followed by whitespace or a colon, then a DNS-label-like identifier.
static POD_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Pp]od[\s:]+([a-z0-9][a-z0-9-]*)").expect("pod extraction pattern is valid")
});

/// Resolve the target of `record`, or `None` when it cannot be targeted.
pub fn resolve(record: &ProblemRecord) -> Option<ResolvedTarget> {
    match &record.detail {
        ProblemDetail::PodObservation(obs) => ResolvedTarget::new(
            obs.namespace.clone(),
            Some(obs.pod_name.clone()),
            None,
            obs.container_name.clone(),
        ),
        ProblemDetail::Anomaly(detail) => resolve_from_hints(&detail.hints, &record.description),
        ProblemDetail::SecurityThreat(detail) => resolve_from_hints(&detail.hints, &record.description),
    }
}

fn resolve_from_hints(hints: &ClassifierHints, description: &str) -> Option<ResolvedTarget> {
    let params = hints.auto_heal_params.clone().unwrap_or_default();
    let hinted_namespace = params
        .namespace
        .clone()
        .filter(|ns| !ns.trim().is_empty());
    let namespace = || hinted_namespace.clone().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    // 1. Explicit auto-heal parameters.
    if let Some(target) = ResolvedTarget::new(
        namespace(),
        params.pod_name.clone(),
        params.deployment_name.clone(),
        params.container_name.clone(),
    ) {
        return Some(target);
    }

    // 2. First affected pod, "namespace/pod" or bare.
    if let Some(entry) = hints.affected_pods.first() {
        let (ns, pod) = split_pod_ref(entry);
        let ns = ns.map(str::to_string).unwrap_or_else(namespace);
        if let Some(target) = ResolvedTarget::new(ns, Some(pod.to_string()), None, params.container_name.clone()) {
            return Some(target);
        }
    }

    // 3. Pod token in the free-text description.
    extract_pod_name(description)
        .and_then(|pod| ResolvedTarget::new(namespace(), Some(pod), None, params.container_name.clone()))
}

/// Split `"namespace/pod"` into its parts. A bare name has no namespace.
fn split_pod_ref(entry: &str) -> (Option<&str>, &str) {
    let entry = entry.trim();
    match entry.split_once('/') {
        Some((ns, pod)) if !ns.trim().is_empty() => (Some(ns.trim()), pod.trim()),
        Some((_, pod)) => (None, pod.trim()),
        None => (None, entry),
    }
}

/// Pull a pod name out of text such as `"pod api-7d8f-abc is crash looping"`.
///
/// Generated pod names carry a hyphen or a digit, which keeps prose like
/// "Pod is crash looping" from resolving to a pod named `is`.
pub fn extract_pod_name(text: &str) -> Option<String> {
    POD_IN_TEXT
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('-'))
        .find(|name| name.contains(|c: char| c == '-' || c.is_ascii_digit()))
        .map(str::to_string)
}

/// Guess the owning deployment of a pod by dropping the ReplicaSet hash and
/// pod suffix, e.g. `api-7d8f9c-x2x` -> `api`.
///
/// Heuristic: correct for pods created by Deployments with generated names,
/// wrong for StatefulSets, bare pods and custom naming schemes. Names with
/// fewer than three segments yield `None`.
pub fn derive_deployment_name(pod_name: &str) -> Option<String> {
    let segments: Vec<&str> = pod_name.split('-').collect();
    if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments[..segments.len() - 2].join("-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AnomalyDetail, AutoHealParams, PodObservationDetail, SeverityLevel, ThreatDetail,
    };

    fn anomaly_with(hints: ClassifierHints, description: &str) -> ProblemRecord {
        ProblemRecord::new(
            "cluster-a",
            SeverityLevel::High,
            "crash_loop_backoff",
            ProblemDetail::Anomaly(AnomalyDetail { hints, ..Default::default() }),
        )
        .with_description(description)
    }

    #[test]
    fn test_explicit_params_win() {
        let hints = ClassifierHints {
            auto_heal_params: Some(AutoHealParams {
                pod_name: Some("web-5f6d7-abcde".to_string()),
                namespace: Some("shop".to_string()),
                container_name: Some("nginx".to_string()),
                ..Default::default()
            }),
            affected_pods: vec!["prod/api-7d8f-abc".to_string()],
            ..Default::default()
        };

        let target = resolve(&anomaly_with(hints, "pod other-pod failing")).unwrap();
        assert_eq!(target.namespace, "shop");
        assert_eq!(target.pod_name.as_deref(), Some("web-5f6d7-abcde"));
        assert_eq!(target.container_name.as_deref(), Some("nginx"));
    }

    #[test]
    fn test_affected_pods_with_namespace() {
        let hints = ClassifierHints {
            affected_pods: vec!["prod/api-7d8f-abc".to_string(), "prod/api-7d8f-def".to_string()],
            ..Default::default()
        };

        let target = resolve(&anomaly_with(hints, "")).unwrap();
        assert_eq!(target.namespace, "prod");
        assert_eq!(target.pod_name.as_deref(), Some("api-7d8f-abc"));
    }

    #[test]
    fn test_bare_affected_pod_defaults_namespace() {
        let hints = ClassifierHints {
            affected_pods: vec!["worker-1".to_string()],
            ..Default::default()
        };

        let target = resolve(&anomaly_with(hints, "")).unwrap();
        assert_eq!(target.namespace, "default");
        assert_eq!(target.pod_name.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_namespace_only_params_fall_through() {
        let hints = ClassifierHints {
            auto_heal_params: Some(AutoHealParams {
                namespace: Some("batch".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let target = resolve(&anomaly_with(hints, "OOM detected in pod: etl-6c7b8-q9z")).unwrap();
        assert_eq!(target.namespace, "batch");
        assert_eq!(target.pod_name.as_deref(), Some("etl-6c7b8-q9z"));
    }

    #[test]
    fn test_description_extraction() {
        assert_eq!(extract_pod_name("Pod api-7d8f-abc restarted 12 times"), Some("api-7d8f-abc".to_string()));
        assert_eq!(extract_pod_name("restart of pod:cache-0"), Some("cache-0".to_string()));
        assert_eq!(extract_pod_name("memory pressure on node-3"), None);
        assert_eq!(extract_pod_name("podcast service slow"), None);
    }

    #[test]
    fn test_description_prose_after_pod_is_not_a_name() {
        assert_eq!(extract_pod_name("Pod is crash looping"), None);
        assert_eq!(extract_pod_name("pod keeps restarting"), None);
        assert_eq!(
            extract_pod_name("Pod is crash looping, see pod api-7d8f-abc"),
            Some("api-7d8f-abc".to_string())
        );

        let record = anomaly_with(ClassifierHints::default(), "Pod is crash looping");
        assert!(resolve(&record).is_none());
    }

    #[test]
    fn test_unresolvable_record() {
        let record = anomaly_with(ClassifierHints::default(), "cluster-wide latency spike");
        assert!(resolve(&record).is_none());

        let threat = ProblemRecord::new(
            "cluster-a",
            SeverityLevel::High,
            "unencrypted_secrets",
            ProblemDetail::SecurityThreat(ThreatDetail::default()),
        );
        assert!(resolve(&threat).is_none());
    }

    #[test]
    fn test_pod_observation_targets_its_pod() {
        let record = ProblemRecord::new(
            "cluster-a",
            SeverityLevel::Medium,
            "high_restart_count",
            ProblemDetail::PodObservation(PodObservationDetail {
                pod_name: "api-7d8f9c-x2x".to_string(),
                namespace: "prod".to_string(),
                container_name: Some("api".to_string()),
                ..Default::default()
            }),
        );

        let target = resolve(&record).unwrap();
        assert_eq!(target.to_string(), "prod/api-7d8f9c-x2x");
        assert_eq!(target.container_name.as_deref(), Some("api"));
    }

    #[test]
    fn test_derive_deployment_name() {
        assert_eq!(derive_deployment_name("api-7d8f9c-x2x"), Some("api".to_string()));
        assert_eq!(
            derive_deployment_name("payment-gateway-5b7c9d-q8w7e"),
            Some("payment-gateway".to_string())
        );
        assert_eq!(derive_deployment_name("redis-0"), None);
        assert_eq!(derive_deployment_name("standalone"), None);
    }
}
