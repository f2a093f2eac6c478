//! Severity policy gate.
//!
//! Decides whether a problem record may be remediated automatically. The gate
//! fails safe: without settings nothing is processed unless forced.

use crate::domain::models::{AutoHealSettings, ProblemSource, SeverityLevel};

/// Why the gate denied a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoSettings,
    Disabled,
    CategoryDisabled(ProblemSource),
    BelowThreshold { severity: SeverityLevel, threshold: SeverityLevel },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSettings => write!(f, "no auto-heal settings for cluster"),
            Self::Disabled => write!(f, "auto-heal disabled"),
            Self::CategoryDisabled(source) => write!(f, "auto-apply disabled for {}", source),
            Self::BelowThreshold { severity, threshold } => {
                write!(f, "severity {} below threshold {}", severity, threshold)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed { forced: bool },
    Denied(DenyReason),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Evaluate the gate for one record.
pub fn evaluate(
    severity: SeverityLevel,
    source: ProblemSource,
    settings: Option<&AutoHealSettings>,
    force: bool,
) -> PolicyDecision {
    if force {
        return PolicyDecision::Allowed { forced: true };
    }

    let Some(settings) = settings else {
        return PolicyDecision::Denied(DenyReason::NoSettings);
    };

    if !settings.enabled {
        return PolicyDecision::Denied(DenyReason::Disabled);
    }
    if !settings.auto_apply_for(source) {
        return PolicyDecision::Denied(DenyReason::CategoryDisabled(source));
    }
    if severity.ordinal() < settings.severity_threshold.ordinal() {
        return PolicyDecision::Denied(DenyReason::BelowThreshold {
            severity,
            threshold: settings.severity_threshold,
        });
    }

    PolicyDecision::Allowed { forced: false }
}

pub fn should_process(
    severity: SeverityLevel,
    source: ProblemSource,
    settings: Option<&AutoHealSettings>,
    force: bool,
) -> bool {
    evaluate(severity, source, settings, force).is_allowed()
}
