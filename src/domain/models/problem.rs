//! Problem records produced by external detectors.
//!
//! A problem record is one of three variants (anomaly, security threat, pod
//! observation). The variant-specific payload is a tagged union rather than a
//! free-form object, so target and action resolution can match on it
//! exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::severity::SeverityLevel;

/// Which detector family produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemSource {
    Anomaly,
    SecurityThreat,
    PodObservation,
}

impl ProblemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anomaly => "anomaly",
            Self::SecurityThreat => "security_threat",
            Self::PodObservation => "pod_observation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anomaly" => Some(Self::Anomaly),
            "security_threat" | "threat" => Some(Self::SecurityThreat),
            "pod_observation" | "pod" => Some(Self::PodObservation),
            _ => None,
        }
    }

    /// Dispatch precedence within a cycle. Lower runs first, so a specific
    /// diagnosis is never overwritten by a generic restart candidate.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Anomaly => 0,
            Self::SecurityThreat => 1,
            Self::PodObservation => 2,
        }
    }

    /// Status written to the source record once a remediation was queued.
    pub fn resolved_status(&self) -> &'static str {
        match self {
            Self::SecurityThreat => "mitigated",
            Self::Anomaly | Self::PodObservation => "resolved",
        }
    }
}

impl fmt::Display for ProblemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit targeting parameters supplied by the upstream classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoHealParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

/// Resource requests/limits recommended by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
}

/// Remediation hints shared by anomaly and threat payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierHints {
    /// Action the classifier suggests, used only for unrecognized kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_heal_params: Option<AutoHealParams>,
    /// Pods affected, as `"namespace/pod"` or a bare pod name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_pods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_resources: Option<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_replicas: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyDetail {
    #[serde(flatten)]
    pub hints: ClassifierHints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatDetail {
    #[serde(flatten)]
    pub hints: ClassifierHints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Raw health observation of a single pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodObservationDetail {
    pub pod_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub restart_count: u32,
    /// Waiting/terminated reason reported by the kubelet, e.g. `CrashLoopBackOff`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub(crate) fn default_namespace() -> String {
    "default".to_string()
}

/// Variant-specific payload of a problem record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ProblemDetail {
    Anomaly(AnomalyDetail),
    SecurityThreat(ThreatDetail),
    PodObservation(PodObservationDetail),
}

impl ProblemDetail {
    pub fn source(&self) -> ProblemSource {
        match self {
            Self::Anomaly(_) => ProblemSource::Anomaly,
            Self::SecurityThreat(_) => ProblemSource::SecurityThreat,
            Self::PodObservation(_) => ProblemSource::PodObservation,
        }
    }

    /// Classifier hints, when the variant carries them.
    pub fn hints(&self) -> Option<&ClassifierHints> {
        match self {
            Self::Anomaly(d) => Some(&d.hints),
            Self::SecurityThreat(d) => Some(&d.hints),
            Self::PodObservation(_) => None,
        }
    }
}

/// A detected problem awaiting remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub id: Uuid,
    pub cluster_id: String,
    pub severity: SeverityLevel,
    /// Free-form type tag, e.g. `crash_loop_backoff`.
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resolved: bool,
    pub detail: ProblemDetail,
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ProblemRecord {
    pub fn new(
        cluster_id: impl Into<String>,
        severity: SeverityLevel,
        kind: impl Into<String>,
        detail: ProblemDetail,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id: cluster_id.into(),
            severity,
            kind: kind.into(),
            description: String::new(),
            resolved: false,
            detail,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn source(&self) -> ProblemSource {
        self.detail.source()
    }

    /// Human-readable trigger reason for the audit log.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} '{}' ({})", self.source(), self.kind, self.severity);
        if !self.description.is_empty() {
            summary.push_str(": ");
            summary.push_str(&self.description);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_deserializes_from_detector_json() {
        let json = serde_json::json!({
            "source": "anomaly",
            "suggestedAction": "restart_pod",
            "affectedPods": ["prod/api-7d8f-abc"],
            "autoHealParams": { "podName": "api-7d8f-abc", "namespace": "prod" },
            "metric": "restarts"
        });

        let detail: ProblemDetail = serde_json::from_value(json).unwrap();
        assert_eq!(detail.source(), ProblemSource::Anomaly);

        let hints = detail.hints().unwrap();
        assert_eq!(hints.suggested_action.as_deref(), Some("restart_pod"));
        assert_eq!(hints.affected_pods, vec!["prod/api-7d8f-abc".to_string()]);
        assert_eq!(
            hints.auto_heal_params.as_ref().and_then(|p| p.namespace.as_deref()),
            Some("prod")
        );
    }

    #[test]
    fn test_pod_observation_defaults_namespace() {
        let json = serde_json::json!({
            "source": "pod_observation",
            "podName": "worker-5c9d-xyz",
            "restartCount": 12
        });

        let detail: ProblemDetail = serde_json::from_value(json).unwrap();
        match detail {
            ProblemDetail::PodObservation(obs) => {
                assert_eq!(obs.namespace, "default");
                assert_eq!(obs.restart_count, 12);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_precedence_orders_anomalies_first() {
        assert!(ProblemSource::Anomaly.precedence() < ProblemSource::SecurityThreat.precedence());
        assert!(
            ProblemSource::SecurityThreat.precedence() < ProblemSource::PodObservation.precedence()
        );
        assert_eq!(ProblemSource::SecurityThreat.resolved_status(), "mitigated");
    }

    #[test]
    fn test_summary() {
        let record = ProblemRecord::new(
            "cluster-a",
            SeverityLevel::Critical,
            "oom_killed",
            ProblemDetail::Anomaly(AnomalyDetail::default()),
        )
        .with_description("container exceeded memory limit");

        assert_eq!(
            record.summary(),
            "anomaly 'oom_killed' (critical): container exceeded memory limit"
        );
    }
}
