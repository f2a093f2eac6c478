//! The concrete Kubernetes object a remediation acts upon.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pod and/or deployment in a namespace, derived fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub namespace: String,
    pub pod_name: Option<String>,
    pub deployment_name: Option<String>,
    pub container_name: Option<String>,
}

impl ResolvedTarget {
    /// Build a target from optional parts. Returns `None` unless a pod or a
    /// deployment name is present and non-empty.
    pub fn new(
        namespace: impl Into<String>,
        pod_name: Option<String>,
        deployment_name: Option<String>,
        container_name: Option<String>,
    ) -> Option<Self> {
        let pod_name = non_empty(pod_name);
        let deployment_name = non_empty(deployment_name);
        if pod_name.is_none() && deployment_name.is_none() {
            return None;
        }

        let namespace = namespace.into();
        let namespace = if namespace.trim().is_empty() {
            super::problem::default_namespace()
        } else {
            namespace.trim().to_string()
        };

        Some(Self {
            namespace,
            pod_name,
            deployment_name,
            container_name: non_empty(container_name),
        })
    }

    pub fn pod(namespace: impl Into<String>, pod_name: impl Into<String>) -> Option<Self> {
        Self::new(namespace, Some(pod_name.into()), None, None)
    }

    /// Deduplication key: `(namespace, pod name, or deployment name when no pod)`.
    pub fn dedup_key(&self) -> (String, String) {
        let object = self
            .pod_name
            .clone()
            .or_else(|| self.deployment_name.clone())
            .unwrap_or_default();
        (self.namespace.clone(), object)
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.pod_name, &self.deployment_name) {
            (Some(pod), _) => write!(f, "{}/{}", self.namespace, pod),
            (None, Some(deployment)) => write!(f, "{}/deployment/{}", self.namespace, deployment),
            (None, None) => write!(f, "{}/<none>", self.namespace),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
