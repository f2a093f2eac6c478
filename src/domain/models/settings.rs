//! Per-cluster auto-heal policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::problem::ProblemSource;
use super::severity::SeverityLevel;

/// Auto-heal settings for one cluster. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoHealSettings {
    pub cluster_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_apply_anomalies: bool,
    #[serde(default)]
    pub auto_apply_security: bool,
    #[serde(default)]
    pub severity_threshold: SeverityLevel,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AutoHealSettings {
    /// Settings with everything switched off.
    pub fn disabled(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            enabled: false,
            auto_apply_anomalies: false,
            auto_apply_security: false,
            severity_threshold: SeverityLevel::default(),
            updated_at: Utc::now(),
        }
    }

    /// Category flag governing records from `source`.
    ///
    /// Pod observations are health signals and follow the anomaly flag.
    pub fn auto_apply_for(&self, source: ProblemSource) -> bool {
        match source {
            ProblemSource::Anomaly | ProblemSource::PodObservation => self.auto_apply_anomalies,
            ProblemSource::SecurityThreat => self.auto_apply_security,
        }
    }
}
