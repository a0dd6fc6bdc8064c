//! Error taxonomy for node agent resolution and reconciliation.
//!
//! Every variant of [`NodeAgentError`] is fatal for the instance that raised
//! it and is recovered at the instance boundary by the fleet aggregator.
//! A pending change is not an error and never appears here.

use thiserror::Error;

use super::resource::ResourceKind;

/// Errors returned by the external collaborators (control-plane reconciler
/// and the aggregator data provider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The control plane could not be reached.
    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    /// The control plane refused the desired object.
    #[error("rejected by control plane: {0}")]
    Rejected(String),
}

/// Per-instance errors.
#[derive(Debug, Error)]
pub enum NodeAgentError {
    /// Mutually exclusive variants were supplied, or none at all.
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Two layers could not be merged because their shapes disagree.
    #[error("merge failure at `{path}`: {reason}")]
    MergeFailure { path: String, reason: String },

    /// A resource factory could not produce a well-formed descriptor.
    #[error("resource factory `{factory}` failed: {reason}")]
    FactoryFailure { factory: String, reason: String },

    /// The external reconciler reported a non-retryable failure.
    #[error("failed to reconcile {kind} `{name}`: {source}")]
    ReconcileFailure {
        kind: ResourceKind,
        name: String,
        #[source]
        source: CollaboratorError,
    },

    /// The aggregator data provider failed while rendering the config payload.
    #[error("aggregator data provider failed: {source}")]
    DataProvider {
        #[source]
        source: CollaboratorError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NodeAgentError {
    pub fn merge(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MergeFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn factory(factory: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FactoryFailure {
            factory: factory.into(),
            reason: reason.into(),
        }
    }

    /// Attach a factory name. Errors already naming a factory pass through.
    pub fn attributed_to(self, factory: &str) -> Self {
        match self {
            Self::FactoryFailure { .. } => self,
            other => Self::factory(factory, other.to_string()),
        }
    }

    /// Short, stable label used in logs and reports.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigurationConflict(_) => "configuration_conflict",
            Self::MergeFailure { .. } => "merge_failure",
            Self::FactoryFailure { .. } => "factory_failure",
            Self::ReconcileFailure { .. } => "reconcile_failure",
            Self::DataProvider { .. } => "data_provider",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Result type for per-instance operations.
pub type NodeAgentResult<T> = std::result::Result<T, NodeAgentError>;

/// A failed instance inside a fleet pass.
#[derive(Debug)]
pub struct InstanceFailure {
    pub instance: String,
    pub error: NodeAgentError,
}

/// Combined failure of a fleet pass: one entry per failed instance.
#[derive(Debug, Error)]
#[error("{} node agent instance(s) failed: {}", .failures.len(), render_failures(.failures))]
pub struct FleetError {
    pub failures: Vec<InstanceFailure>,
}

impl FleetError {
    pub fn instances(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.instance.as_str()).collect()
    }

    pub fn error_for(&self, instance: &str) -> Option<&NodeAgentError> {
        self.failures
            .iter()
            .find(|f| f.instance == instance)
            .map(|f| &f.error)
    }
}

fn render_failures(failures: &[InstanceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.instance, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_conflict_display() {
        let err = NodeAgentError::ConfigurationConflict("both variants set".to_string());
        assert!(err.to_string().contains("configuration conflict"));
        assert_eq!(err.category(), "configuration_conflict");
    }

    #[test]
    fn test_merge_failure_displays_path() {
        let err = NodeAgentError::merge("spec.inputTail", "expected mapping, found string");
        let msg = err.to_string();
        assert!(msg.contains("spec.inputTail"));
        assert!(msg.contains("expected mapping"));
    }

    #[test]
    fn test_reconcile_failure_keeps_kind_and_name() {
        let err = NodeAgentError::ReconcileFailure {
            kind: ResourceKind::DaemonSet,
            name: "fleet-a-fluentbit".to_string(),
            source: CollaboratorError::Rejected("immutable selector".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("DaemonSet"));
        assert!(msg.contains("fleet-a-fluentbit"));
        assert!(msg.contains("immutable selector"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_attributed_to_names_factory() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = NodeAgentError::from(source).attributed_to("daemon_set");
        match &err {
            NodeAgentError::FactoryFailure { factory, reason } => {
                assert_eq!(factory, "daemon_set");
                assert!(reason.contains("serialization"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let kept = NodeAgentError::factory("config_secret", "empty").attributed_to("daemon_set");
        assert!(kept.to_string().contains("config_secret"));
    }

    #[test]
    fn test_fleet_error_lists_every_instance() {
        let err = FleetError {
            failures: vec![
                InstanceFailure {
                    instance: "a".to_string(),
                    error: NodeAgentError::ConfigurationConflict("x".to_string()),
                },
                InstanceFailure {
                    instance: "b".to_string(),
                    error: NodeAgentError::factory("daemonset", "no image"),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 node agent instance(s) failed"));
        assert!(msg.contains("[a]"));
        assert!(msg.contains("[b]"));
        assert_eq!(err.instances(), vec!["a", "b"]);
        assert!(matches!(
            err.error_for("b"),
            Some(NodeAgentError::FactoryFailure { .. })
        ));
    }
}
