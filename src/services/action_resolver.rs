//! Action resolution: maps a problem kind and its resolved target to a
//! remediation action with fully qualified parameters.
//!
//! The kind table is a closed, exhaustive match over [`ProblemKind`]. Kinds
//! outside it fall back to the classifier's suggested action, then to a pod
//! restart when `restart_unrecognized_kinds` is set. Every fallback is logged.

use crate::domain::models::action::params;
use crate::domain::models::{
    ActionType, ClassifierHints, ProblemDetail, ProblemKind, ReconcileConfig, RemediationAction,
    ResolvedTarget, ResourceSpec,
};
use crate::services::target_resolver::derive_deployment_name;

/// Replicas added by `scale_deployment`.
pub const REPLICA_INCREMENT: u32 = 2;
/// Assumed current replica count when the detector did not report one.
pub const DEFAULT_CURRENT_REPLICAS: u32 = 1;

/// Defaults applied for `oom_killed` / `resource_limit_too_low` when the
/// classifier does not recommend resources.
pub const RAISED_CPU_REQUEST: &str = "500m";
pub const RAISED_MEMORY_REQUEST: &str = "512Mi";
pub const RAISED_CPU_LIMIT: &str = "1000m";
pub const RAISED_MEMORY_LIMIT: &str = "1Gi";

/// Baseline applied for `missing_resource_limits`.
pub const BASELINE_CPU_REQUEST: &str = "100m";
pub const BASELINE_MEMORY_REQUEST: &str = "128Mi";
pub const BASELINE_CPU_LIMIT: &str = "500m";
pub const BASELINE_MEMORY_LIMIT: &str = "512Mi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResolution {
    Action(RemediationAction),
    Skip(String),
}

#[derive(Debug, Clone)]
pub struct ActionResolverConfig {
    pub max_replicas: u32,
    pub restart_unrecognized_kinds: bool,
}

impl Default for ActionResolverConfig {
    fn default() -> Self {
        Self {
            max_replicas: 10,
            restart_unrecognized_kinds: true,
        }
    }
}

impl From<&ReconcileConfig> for ActionResolverConfig {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            max_replicas: config.max_replicas,
            restart_unrecognized_kinds: config.restart_unrecognized_kinds,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionResolver {
    config: ActionResolverConfig,
}

impl ActionResolver {
    pub fn new(config: ActionResolverConfig) -> Self {
        Self { config }
    }

    /// Pick the action type for a kind, without building parameters.
    pub fn action_type_for(&self, kind: &ProblemKind, hints: Option<&ClassifierHints>) -> Option<ActionType> {
        let action = match kind {
            ProblemKind::PodRestartLoop | ProblemKind::CrashLoopBackOff | ProblemKind::HighRestartCount => {
                ActionType::RestartPod
            }
            ProblemKind::HighResourceUsage | ProblemKind::ResourceExhaustion => ActionType::ScaleDeployment,
            ProblemKind::OomKilled | ProblemKind::ResourceLimitTooLow | ProblemKind::MissingResourceLimits => {
                ActionType::UpdateDeploymentResources
            }
            ProblemKind::ImagePullError => {
                if hints.and_then(|h| h.new_image.as_deref()).is_some_and(|i| !i.trim().is_empty()) {
                    ActionType::UpdateDeploymentImage
                } else {
                    ActionType::RestartPod
                }
            }
            ProblemKind::MissingNetworkPolicy => ActionType::CreateNetworkPolicy,
            ProblemKind::PrivilegedContainer => ActionType::ApplyPodSecurity,
            ProblemKind::UnencryptedSecrets => ActionType::EnableSecretsEncryption,
            ProblemKind::ExcessiveRbacPermissions => ActionType::RestrictRbac,
            ProblemKind::Unrecognized(raw) => {
                let suggested = hints.and_then(|h| h.suggested_action.as_deref());
                match suggested.and_then(ActionType::from_str) {
                    Some(action) => {
                        tracing::warn!(kind = %raw, action = %action, "unrecognized problem kind, using suggested action");
                        action
                    }
                    None if self.config.restart_unrecognized_kinds => {
                        tracing::warn!(
                            kind = %raw,
                            suggested = suggested.unwrap_or("-"),
                            "unrecognized problem kind, falling back to restart_pod"
                        );
                        ActionType::RestartPod
                    }
                    None => return None,
                }
            }
        };
        Some(action)
    }

    /// Resolve the remediation for `kind` against `target`.
    pub fn resolve(&self, kind: &str, target: &ResolvedTarget, detail: &ProblemDetail) -> ActionResolution {
        let problem_kind = ProblemKind::parse(kind);
        let hints = detail.hints();

        let Some(action_type) = self.action_type_for(&problem_kind, hints) else {
            return ActionResolution::Skip(format!("unrecognized problem kind '{}'", kind.trim()));
        };

        match action_type {
            ActionType::RestartPod => self.restart_pod(kind, target),
            ActionType::ScaleDeployment => self.scale_deployment(target, hints),
            ActionType::UpdateDeploymentResources => {
                let defaults = if problem_kind == ProblemKind::MissingResourceLimits {
                    baseline_resources()
                } else {
                    raised_resources()
                };
                self.update_resources(target, hints.and_then(|h| h.recommended_resources.as_ref()), defaults)
            }
            ActionType::UpdateDeploymentImage => self.update_image(target, hints),
            ActionType::CreateNetworkPolicy => self.create_network_policy(target),
            ActionType::ApplyPodSecurity => self.apply_pod_security(target),
            ActionType::EnableSecretsEncryption => ActionResolution::Action(
                RemediationAction::new(ActionType::EnableSecretsEncryption)
                    .with_param(params::NAMESPACE, &target.namespace),
            ),
            ActionType::RestrictRbac => self.restrict_rbac(target, hints),
        }
    }

    fn restart_pod(&self, kind: &str, target: &ResolvedTarget) -> ActionResolution {
        let Some(pod) = &target.pod_name else {
            return ActionResolution::Skip("restart_pod requires a pod name".to_string());
        };
        ActionResolution::Action(
            RemediationAction::new(ActionType::RestartPod)
                .with_param(params::NAMESPACE, &target.namespace)
                .with_param(params::POD_NAME, pod)
                .with_param(params::REASON, kind.trim()),
        )
    }

    fn scale_deployment(&self, target: &ResolvedTarget, hints: Option<&ClassifierHints>) -> ActionResolution {
        let Some(deployment) = deployment_of(target) else {
            return skip_without_deployment(ActionType::ScaleDeployment);
        };
        let current = hints
            .and_then(|h| h.current_replicas)
            .unwrap_or(DEFAULT_CURRENT_REPLICAS);
        let replicas = current
            .saturating_add(REPLICA_INCREMENT)
            .min(self.config.max_replicas.max(current));

        ActionResolution::Action(
            RemediationAction::new(ActionType::ScaleDeployment)
                .with_param(params::NAMESPACE, &target.namespace)
                .with_param(params::DEPLOYMENT_NAME, deployment)
                .with_param(params::REPLICAS, replicas.to_string()),
        )
    }

    fn update_resources(
        &self,
        target: &ResolvedTarget,
        recommended: Option<&ResourceSpec>,
        defaults: ResourceSpec,
    ) -> ActionResolution {
        let Some(deployment) = deployment_of(target) else {
            return skip_without_deployment(ActionType::UpdateDeploymentResources);
        };

        let pick = |recommended: Option<&String>, default: Option<String>| {
            recommended
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .or(default)
                .unwrap_or_default()
        };
        let recommended = recommended.cloned().unwrap_or_default();

        let action = with_container(
            RemediationAction::new(ActionType::UpdateDeploymentResources)
                .with_param(params::NAMESPACE, &target.namespace)
                .with_param(params::DEPLOYMENT_NAME, deployment),
            target,
        )
        .with_param(params::CPU_REQUEST, pick(recommended.cpu_request.as_ref(), defaults.cpu_request))
        .with_param(params::MEMORY_REQUEST, pick(recommended.memory_request.as_ref(), defaults.memory_request))
        .with_param(params::CPU_LIMIT, pick(recommended.cpu_limit.as_ref(), defaults.cpu_limit))
        .with_param(params::MEMORY_LIMIT, pick(recommended.memory_limit.as_ref(), defaults.memory_limit));

        ActionResolution::Action(action)
    }

    fn update_image(&self, target: &ResolvedTarget, hints: Option<&ClassifierHints>) -> ActionResolution {
        let Some(deployment) = deployment_of(target) else {
            return skip_without_deployment(ActionType::UpdateDeploymentImage);
        };
        let Some(image) = hints.and_then(|h| h.new_image.as_deref()).map(str::trim).filter(|i| !i.is_empty()) else {
            return ActionResolution::Skip("update_deployment_image requires an image".to_string());
        };

        ActionResolution::Action(
            with_container(
                RemediationAction::new(ActionType::UpdateDeploymentImage)
                    .with_param(params::NAMESPACE, &target.namespace)
                    .with_param(params::DEPLOYMENT_NAME, deployment),
                target,
            )
            .with_param(params::IMAGE, image),
        )
    }

    fn create_network_policy(&self, target: &ResolvedTarget) -> ActionResolution {
        let Some(app) = deployment_of(target).or_else(|| target.pod_name.clone()) else {
            return ActionResolution::Skip("create_network_policy requires a workload".to_string());
        };
        ActionResolution::Action(
            RemediationAction::new(ActionType::CreateNetworkPolicy)
                .with_param(params::NAMESPACE, &target.namespace)
                .with_param(params::POD_SELECTOR, format!("app={}", app)),
        )
    }

    fn apply_pod_security(&self, target: &ResolvedTarget) -> ActionResolution {
        let Some(deployment) = deployment_of(target) else {
            return skip_without_deployment(ActionType::ApplyPodSecurity);
        };
        ActionResolution::Action(with_container(
            RemediationAction::new(ActionType::ApplyPodSecurity)
                .with_param(params::NAMESPACE, &target.namespace)
                .with_param(params::DEPLOYMENT_NAME, deployment),
            target,
        ))
    }

    fn restrict_rbac(&self, target: &ResolvedTarget, hints: Option<&ClassifierHints>) -> ActionResolution {
        let service_account = hints
            .and_then(|h| h.auto_heal_params.as_ref())
            .and_then(|p| p.service_account.as_deref())
            .map(str::trim)
            .filter(|sa| !sa.is_empty());
        let Some(service_account) = service_account else {
            return ActionResolution::Skip("restrict_rbac requires a service account".to_string());
        };
        ActionResolution::Action(
            RemediationAction::new(ActionType::RestrictRbac)
                .with_param(params::NAMESPACE, &target.namespace)
                .with_param(params::SERVICE_ACCOUNT, service_account),
        )
    }
}

/// Deployment named by the target, else derived from its pod name.
fn deployment_of(target: &ResolvedTarget) -> Option<String> {
    target
        .deployment_name
        .clone()
        .or_else(|| target.pod_name.as_deref().and_then(derive_deployment_name))
}

/// Name the container, or tell the executor to infer the single one.
fn with_container(action: RemediationAction, target: &ResolvedTarget) -> RemediationAction {
    match &target.container_name {
        Some(container) => action.with_param(params::CONTAINER_NAME, container),
        None => action.with_param(params::CONTAINER_STRATEGY, params::INFER_SINGLE_CONTAINER),
    }
}

fn skip_without_deployment(action: ActionType) -> ActionResolution {
    ActionResolution::Skip(format!("{} requires a deployment name", action))
}

fn raised_resources() -> ResourceSpec {
    ResourceSpec {
        cpu_request: Some(RAISED_CPU_REQUEST.to_string()),
        memory_request: Some(RAISED_MEMORY_REQUEST.to_string()),
        cpu_limit: Some(RAISED_CPU_LIMIT.to_string()),
        memory_limit: Some(RAISED_MEMORY_LIMIT.to_string()),
    }
}

fn baseline_resources() -> ResourceSpec {
    ResourceSpec {
        cpu_request: Some(BASELINE_CPU_REQUEST.to_string()),
        memory_request: Some(BASELINE_MEMORY_REQUEST.to_string()),
        cpu_limit: Some(BASELINE_CPU_LIMIT.to_string()),
        memory_limit: Some(BASELINE_MEMORY_LIMIT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AnomalyDetail, AutoHealParams, PodObservationDetail, ThreatDetail};

    fn resolver() -> ActionResolver {
        ActionResolver::default()
    }

    fn anomaly(hints: ClassifierHints) -> ProblemDetail {
        ProblemDetail::Anomaly(AnomalyDetail { hints, ..Default::default() })
    }

    fn pod_target() -> ResolvedTarget {
        ResolvedTarget::pod("prod", "api-7d8f9c-x2x").unwrap()
    }

    fn expect_action(resolution: ActionResolution) -> RemediationAction {
        match resolution {
            ActionResolution::Action(action) => action,
            ActionResolution::Skip(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_crash_loop_restarts_pod() {
        let target = ResolvedTarget::pod("prod", "api-7d8f-abc").unwrap();
        let action = expect_action(resolver().resolve("crash_loop_backoff", &target, &anomaly(ClassifierHints::default())));

        assert_eq!(action.action_type, ActionType::RestartPod);
        assert_eq!(action.param(params::NAMESPACE), Some("prod"));
        assert_eq!(action.param(params::POD_NAME), Some("api-7d8f-abc"));
        assert_eq!(action.param(params::REASON), Some("crash_loop_backoff"));
    }

    #[test]
    fn test_scale_adds_increment_with_cap() {
        let hints = ClassifierHints { current_replicas: Some(3), ..Default::default() };
        let action = expect_action(resolver().resolve("high_resource_usage", &pod_target(), &anomaly(hints)));
        assert_eq!(action.action_type, ActionType::ScaleDeployment);
        assert_eq!(action.param(params::DEPLOYMENT_NAME), Some("api"));
        assert_eq!(action.param(params::REPLICAS), Some("5"));

        let hints = ClassifierHints { current_replicas: Some(9), ..Default::default() };
        let action = expect_action(resolver().resolve("resource_exhaustion", &pod_target(), &anomaly(hints)));
        assert_eq!(action.param(params::REPLICAS), Some("10"));

        let action = expect_action(resolver().resolve("resource_exhaustion", &pod_target(), &anomaly(ClassifierHints::default())));
        assert_eq!(action.param(params::REPLICAS), Some("3"));
    }

    #[test]
    fn test_oom_uses_recommended_then_defaults() {
        let hints = ClassifierHints {
            recommended_resources: Some(ResourceSpec {
                memory_limit: Some("2Gi".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let action = expect_action(resolver().resolve("oom_killed", &pod_target(), &anomaly(hints)));

        assert_eq!(action.action_type, ActionType::UpdateDeploymentResources);
        assert_eq!(action.param(params::MEMORY_LIMIT), Some("2Gi"));
        assert_eq!(action.param(params::CPU_LIMIT), Some(RAISED_CPU_LIMIT));
        assert_eq!(action.param(params::MEMORY_REQUEST), Some(RAISED_MEMORY_REQUEST));
        assert_eq!(action.param(params::CONTAINER_STRATEGY), Some(params::INFER_SINGLE_CONTAINER));
        assert_eq!(action.param(params::CONTAINER_NAME), None);
    }

    #[test]
    fn test_missing_limits_uses_baseline() {
        let target = ResolvedTarget::new("prod", None, Some("api".to_string()), Some("app".to_string())).unwrap();
        let detail = ProblemDetail::SecurityThreat(ThreatDetail::default());
        let action = expect_action(resolver().resolve("missing_resource_limits", &target, &detail));

        assert_eq!(action.param(params::CPU_REQUEST), Some(BASELINE_CPU_REQUEST));
        assert_eq!(action.param(params::MEMORY_LIMIT), Some(BASELINE_MEMORY_LIMIT));
        assert_eq!(action.param(params::CONTAINER_NAME), Some("app"));
    }

    #[test]
    fn test_image_pull_error_depends_on_new_image() {
        let hints = ClassifierHints { new_image: Some("registry/api:1.4.2".to_string()), ..Default::default() };
        let action = expect_action(resolver().resolve("image_pull_error", &pod_target(), &anomaly(hints)));
        assert_eq!(action.action_type, ActionType::UpdateDeploymentImage);
        assert_eq!(action.param(params::IMAGE), Some("registry/api:1.4.2"));

        let action = expect_action(resolver().resolve("image_pull_error", &pod_target(), &anomaly(ClassifierHints::default())));
        assert_eq!(action.action_type, ActionType::RestartPod);
    }

    #[test]
    fn test_security_kinds() {
        let detail = ProblemDetail::SecurityThreat(ThreatDetail {
            hints: ClassifierHints {
                auto_heal_params: Some(AutoHealParams {
                    service_account: Some("ci-bot".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        });

        let policy = expect_action(resolver().resolve("missing_network_policy", &pod_target(), &detail));
        assert_eq!(policy.action_type, ActionType::CreateNetworkPolicy);
        assert_eq!(policy.param(params::POD_SELECTOR), Some("app=api"));

        let security = expect_action(resolver().resolve("privileged_container", &pod_target(), &detail));
        assert_eq!(security.action_type, ActionType::ApplyPodSecurity);

        let secrets = expect_action(resolver().resolve("unencrypted_secrets", &pod_target(), &detail));
        assert_eq!(secrets.action_type, ActionType::EnableSecretsEncryption);

        let rbac = expect_action(resolver().resolve("excessive_rbac_permissions", &pod_target(), &detail));
        assert_eq!(rbac.param(params::SERVICE_ACCOUNT), Some("ci-bot"));
    }

    #[test]
    fn test_restrict_rbac_without_service_account_skips() {
        let detail = ProblemDetail::SecurityThreat(ThreatDetail::default());
        assert!(matches!(
            resolver().resolve("excessive_rbac_permissions", &pod_target(), &detail),
            ActionResolution::Skip(_)
        ));
    }

    #[test]
    fn test_unrecognized_kind_fallbacks() {
        let hints = ClassifierHints { suggested_action: Some("scale-deployment".to_string()), ..Default::default() };
        let action = expect_action(resolver().resolve("disk_pressure", &pod_target(), &anomaly(hints)));
        assert_eq!(action.action_type, ActionType::ScaleDeployment);

        let action = expect_action(resolver().resolve("disk_pressure", &pod_target(), &anomaly(ClassifierHints::default())));
        assert_eq!(action.action_type, ActionType::RestartPod);

        let strict = ActionResolver::new(ActionResolverConfig {
            restart_unrecognized_kinds: false,
            ..Default::default()
        });
        assert!(matches!(
            strict.resolve("disk_pressure", &pod_target(), &anomaly(ClassifierHints::default())),
            ActionResolution::Skip(_)
        ));
    }

    #[test]
    fn test_deployment_actions_skip_when_underivable() {
        let target = ResolvedTarget::pod("prod", "redis-0").unwrap();
        assert_eq!(
            resolver().resolve("oom_killed", &target, &anomaly(ClassifierHints::default())),
            ActionResolution::Skip("update_deployment_resources requires a deployment name".to_string())
        );
    }

    #[test]
    fn test_restart_requires_pod() {
        let target = ResolvedTarget::new("prod", None, Some("api".to_string()), None).unwrap();
        let detail = ProblemDetail::PodObservation(PodObservationDetail::default());
        assert!(matches!(
            resolver().resolve("pod_restart_loop", &target, &detail),
            ActionResolution::Skip(_)
        ));
    }
}
