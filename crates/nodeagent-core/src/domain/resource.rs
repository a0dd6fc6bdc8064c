//! Managed resource descriptors and reconcile outcomes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CollaboratorError;

/// Control-plane object kinds produced by the resource factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    PodSecurityPolicy,
    Secret,
    DaemonSet,
    Service,
    ServiceMonitor,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::PodSecurityPolicy => "PodSecurityPolicy",
            ResourceKind::Secret => "Secret",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Service => "Service",
            ResourceKind::ServiceMonitor => "ServiceMonitor",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::ServiceAccount | ResourceKind::Secret | ResourceKind::Service => "v1",
            ResourceKind::ClusterRole | ResourceKind::ClusterRoleBinding => {
                "rbac.authorization.k8s.io/v1"
            }
            ResourceKind::PodSecurityPolicy => "policy/v1beta1",
            ResourceKind::DaemonSet => "apps/v1",
            ResourceKind::ServiceMonitor => "monitoring.coreos.com/v1",
        }
    }

    /// Cluster-scoped kinds carry no namespace.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(
            self,
            ResourceKind::ClusterRole
                | ResourceKind::ClusterRoleBinding
                | ResourceKind::PodSecurityPolicy
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intended lifecycle state of a desired object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Present,
    Absent,
}

/// The unit produced by a resource factory and consumed by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedResourceDescriptor {
    pub kind: ResourceKind,
    /// Full desired manifest, including `apiVersion`, `kind` and `metadata`.
    pub object: Value,
    pub state: DesiredState,
}

impl ManagedResourceDescriptor {
    pub fn present(kind: ResourceKind, object: Value) -> Self {
        Self {
            kind,
            object,
            state: DesiredState::Present,
        }
    }

    pub fn absent(kind: ResourceKind, object: Value) -> Self {
        Self {
            kind,
            object,
            state: DesiredState::Absent,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.object
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
    }

    /// `namespace/name` or just `name` for cluster-scoped objects.
    pub fn identity(&self) -> String {
        let name = self.name().unwrap_or("<unnamed>");
        match self.namespace() {
            Some(ns) => format!("{ns}/{name}"),
            None => name.to_string(),
        }
    }
}

/// Requeue signal reported by the external reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequeueHint {
    /// Retry as soon as possible.
    pub requeue: bool,
    /// Retry after this delay; `None` means no delay was requested.
    pub after: Option<Duration>,
}

impl RequeueHint {
    pub fn immediate() -> Self {
        Self {
            requeue: true,
            after: None,
        }
    }

    pub fn after(delay: Duration) -> Self {
        Self {
            requeue: false,
            after: Some(delay),
        }
    }

    /// Fold two hints into the most urgent one: any immediate requeue wins
    /// and the shortest non-zero delay is kept.
    pub fn most_urgent(self, other: RequeueHint) -> RequeueHint {
        let after = match (
            self.after.filter(|d| !d.is_zero()),
            other.after.filter(|d| !d.is_zero()),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        RequeueHint {
            requeue: self.requeue || other.requeue,
            after,
        }
    }
}

/// Outcome of submitting one descriptor to the external reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    NoChangeNeeded,
    PendingChange(RequeueHint),
    Failed(CollaboratorError),
}

impl From<Result<Option<RequeueHint>, CollaboratorError>> for ReconcileOutcome {
    fn from(result: Result<Option<RequeueHint>, CollaboratorError>) -> Self {
        match result {
            Ok(None) => ReconcileOutcome::NoChangeNeeded,
            Ok(Some(hint)) => ReconcileOutcome::PendingChange(hint),
            Err(e) => ReconcileOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_identity() {
        let d = ManagedResourceDescriptor::present(
            ResourceKind::Secret,
            json!({"metadata": {"name": "fleet-a-fluentbit", "namespace": "logging"}}),
        );
        assert_eq!(d.name(), Some("fleet-a-fluentbit"));
        assert_eq!(d.identity(), "logging/fleet-a-fluentbit");

        let cluster = ManagedResourceDescriptor::absent(
            ResourceKind::ClusterRole,
            json!({"metadata": {"name": "fleet-a-fluentbit"}}),
        );
        assert_eq!(cluster.identity(), "fleet-a-fluentbit");
        assert_eq!(cluster.state, DesiredState::Absent);
    }

    #[test]
    fn test_descriptor_empty_name_is_none() {
        let d = ManagedResourceDescriptor::present(
            ResourceKind::Secret,
            json!({"metadata": {"name": ""}}),
        );
        assert_eq!(d.name(), None);
    }

    #[test]
    fn test_most_urgent_keeps_shortest_delay() {
        let a = RequeueHint::after(Duration::from_secs(30));
        let b = RequeueHint::after(Duration::from_secs(5));
        let merged = a.most_urgent(b);
        assert_eq!(merged.after, Some(Duration::from_secs(5)));
        assert!(!merged.requeue);
    }

    #[test]
    fn test_most_urgent_immediate_sticks() {
        let merged =
            RequeueHint::immediate().most_urgent(RequeueHint::after(Duration::from_secs(10)));
        assert!(merged.requeue);
        assert_eq!(merged.after, Some(Duration::from_secs(10)));

        let none = RequeueHint::default().most_urgent(RequeueHint::default());
        assert_eq!(none, RequeueHint::default());
    }

    #[test]
    fn test_outcome_from_reconciler_result() {
        assert_eq!(ReconcileOutcome::from(Ok(None)), ReconcileOutcome::NoChangeNeeded);
        assert_eq!(
            ReconcileOutcome::from(Ok(Some(RequeueHint::immediate()))),
            ReconcileOutcome::PendingChange(RequeueHint::immediate())
        );
        assert!(matches!(
            ReconcileOutcome::from(Err(CollaboratorError::Unavailable("x".into()))),
            ReconcileOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_api_versions() {
        assert_eq!(ResourceKind::DaemonSet.api_version(), "apps/v1");
        assert_eq!(ResourceKind::ServiceMonitor.api_version(), "monitoring.coreos.com/v1");
        assert!(ResourceKind::ClusterRoleBinding.is_cluster_scoped());
        assert!(!ResourceKind::Secret.is_cluster_scoped());
    }
}
