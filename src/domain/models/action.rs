//! Remediation actions and the closed set of recognized problem kinds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter keys understood by the executor agent.
pub mod params {
    pub const NAMESPACE: &str = "namespace";
    pub const POD_NAME: &str = "pod_name";
    pub const DEPLOYMENT_NAME: &str = "deployment_name";
    pub const CONTAINER_NAME: &str = "container_name";
    /// Present instead of `container_name` when the executor must pick the
    /// deployment's only container itself.
    pub const CONTAINER_STRATEGY: &str = "container_strategy";
    pub const INFER_SINGLE_CONTAINER: &str = "infer_single";
    pub const REASON: &str = "reason";
    pub const REPLICAS: &str = "replicas";
    pub const CPU_REQUEST: &str = "cpu_request";
    pub const MEMORY_REQUEST: &str = "memory_request";
    pub const CPU_LIMIT: &str = "cpu_limit";
    pub const MEMORY_LIMIT: &str = "memory_limit";
    pub const IMAGE: &str = "image";
    pub const POD_SELECTOR: &str = "pod_selector";
    pub const SERVICE_ACCOUNT: &str = "service_account";
}

/// Closed set of actions the executor agent can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    RestartPod,
    ScaleDeployment,
    UpdateDeploymentResources,
    UpdateDeploymentImage,
    CreateNetworkPolicy,
    ApplyPodSecurity,
    EnableSecretsEncryption,
    RestrictRbac,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        Self::RestartPod,
        Self::ScaleDeployment,
        Self::UpdateDeploymentResources,
        Self::UpdateDeploymentImage,
        Self::CreateNetworkPolicy,
        Self::ApplyPodSecurity,
        Self::EnableSecretsEncryption,
        Self::RestrictRbac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestartPod => "restart_pod",
            Self::ScaleDeployment => "scale_deployment",
            Self::UpdateDeploymentResources => "update_deployment_resources",
            Self::UpdateDeploymentImage => "update_deployment_image",
            Self::CreateNetworkPolicy => "create_network_policy",
            Self::ApplyPodSecurity => "apply_pod_security",
            Self::EnableSecretsEncryption => "enable_secrets_encryption",
            Self::RestrictRbac => "restrict_rbac",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == normalized)
    }

    /// Whether the action operates on a single pod rather than its owning deployment.
    pub fn targets_pod(&self) -> bool {
        matches!(self, Self::RestartPod)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Problem kinds with a known remediation.
///
/// Kinds outside this set are carried as [`ProblemKind::Unrecognized`] so the
/// resolver can flag them instead of silently treating them as restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    PodRestartLoop,
    CrashLoopBackOff,
    HighRestartCount,
    HighResourceUsage,
    ResourceExhaustion,
    OomKilled,
    ResourceLimitTooLow,
    ImagePullError,
    MissingResourceLimits,
    MissingNetworkPolicy,
    PrivilegedContainer,
    UnencryptedSecrets,
    ExcessiveRbacPermissions,
    Unrecognized(String),
}

impl ProblemKind {
    pub fn parse(kind: &str) -> Self {
        let normalized = kind.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pod_restart_loop" => Self::PodRestartLoop,
            "crash_loop_backoff" | "crashloopbackoff" => Self::CrashLoopBackOff,
            "high_restart_count" => Self::HighRestartCount,
            "high_resource_usage" => Self::HighResourceUsage,
            "resource_exhaustion" => Self::ResourceExhaustion,
            "oom_killed" | "oomkilled" => Self::OomKilled,
            "resource_limit_too_low" => Self::ResourceLimitTooLow,
            "image_pull_error" | "image_pull_backoff" | "imagepullbackoff" | "errimagepull" => {
                Self::ImagePullError
            }
            "missing_resource_limits" => Self::MissingResourceLimits,
            "missing_network_policy" => Self::MissingNetworkPolicy,
            "privileged_container" => Self::PrivilegedContainer,
            "unencrypted_secrets" => Self::UnencryptedSecrets,
            "excessive_rbac_permissions" | "overprivileged_rbac" => Self::ExcessiveRbacPermissions,
            _ => Self::Unrecognized(kind.trim().to_string()),
        }
    }
}

/// A concrete remediation with fully qualified parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub action_type: ActionType,
    pub params: BTreeMap<String, String>,
}

impl RemediationAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_round_trips_through_str() {
        for action in ActionType::ALL {
            assert_eq!(ActionType::from_str(action.as_str()), Some(action));
        }
        assert_eq!(ActionType::from_str("Restart-Pod"), Some(ActionType::RestartPod));
        assert_eq!(ActionType::from_str("delete_cluster"), None);
    }

    #[test]
    fn test_problem_kind_parse() {
        assert_eq!(ProblemKind::parse("crash_loop_backoff"), ProblemKind::CrashLoopBackOff);
        assert_eq!(ProblemKind::parse("CrashLoopBackOff"), ProblemKind::CrashLoopBackOff);
        assert_eq!(ProblemKind::parse("OOMKilled"), ProblemKind::OomKilled);
        assert_eq!(ProblemKind::parse("image-pull-error"), ProblemKind::ImagePullError);
        assert_eq!(
            ProblemKind::parse("disk_pressure"),
            ProblemKind::Unrecognized("disk_pressure".to_string())
        );
    }

    #[test]
    fn test_params_are_ordered() {
        let action = RemediationAction::new(ActionType::RestartPod)
            .with_param(params::POD_NAME, "api-1")
            .with_param(params::NAMESPACE, "prod");
        let keys: Vec<_> = action.params.keys().cloned().collect();
        assert_eq!(keys, vec!["namespace".to_string(), "pod_name".to_string()]);
        assert_eq!(action.param(params::NAMESPACE), Some("prod"));
    }
}
