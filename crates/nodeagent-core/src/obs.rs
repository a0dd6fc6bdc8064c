//! Structured lifecycle events for fleet passes.
//!
//! - `pass_span` / `instance_span`: spans for instrumenting async passes
//! - `PassSpan` / `InstanceSpan`: RAII guards for synchronous callers
//! - `emit_*`: one `info!` (or `warn!`) per lifecycle transition
//!
//! Filter with `RUST_LOG`, e.g. `RUST_LOG=nodeagent_core=info`.

use std::time::Duration;

use tracing::{info, warn, Span};

use crate::domain::{DesiredState, NodeAgentError, RequeueHint, ResourceKind};

/// Span covering one fleet-level pass.
pub fn pass_span(pass_id: &str, fleet: &str) -> Span {
    tracing::info_span!("nodeagent.pass", pass_id = %pass_id, fleet = %fleet)
}

/// Span covering one instance inside a pass.
pub fn instance_span(instance: &str) -> Span {
    tracing::info_span!("nodeagent.instance", instance = %instance)
}

/// Entered [`pass_span`]. Not `Send`; do not hold across `.await`.
pub struct PassSpan {
    _span: tracing::span::EnteredSpan,
}

impl PassSpan {
    pub fn enter(pass_id: &str, fleet: &str) -> Self {
        Self {
            _span: pass_span(pass_id, fleet).entered(),
        }
    }
}

/// Entered [`instance_span`]. Not `Send`; do not hold across `.await`.
pub struct InstanceSpan {
    _span: tracing::span::EnteredSpan,
}

impl InstanceSpan {
    pub fn enter(instance: &str) -> Self {
        Self {
            _span: instance_span(instance).entered(),
        }
    }
}

pub fn emit_pass_started(pass_id: &str, fleet: &str, instances: usize) {
    info!(event = "pass.started", pass_id = %pass_id, fleet = %fleet, instances = instances);
}

pub fn emit_pass_finished(pass_id: &str, duration_ms: u64, requeued: bool, failures: usize) {
    info!(
        event = "pass.finished",
        pass_id = %pass_id,
        duration_ms = duration_ms,
        requeued = requeued,
        failures = failures,
    );
}

pub fn emit_instance_resolved(instance: &str, variant: &str, profile: Option<&str>) {
    info!(
        event = "instance.resolved",
        instance = %instance,
        variant = %variant,
        profile = profile.unwrap_or("default"),
    );
}

pub fn emit_resource_reconciled(
    instance: &str,
    kind: ResourceKind,
    name: &str,
    state: DesiredState,
    changed: bool,
) {
    info!(
        event = "resource.reconciled",
        instance = %instance,
        kind = %kind,
        name = %name,
        state = ?state,
        changed = changed,
    );
}

pub fn emit_instance_requeued(instance: &str, factory: &str, hint: &RequeueHint) {
    info!(
        event = "instance.requeued",
        instance = %instance,
        factory = %factory,
        immediate = hint.requeue,
        after_ms = hint.after.map(duration_ms).unwrap_or(0),
    );
}

pub fn emit_instance_failed(instance: &str, error: &NodeAgentError) {
    warn!(
        event = "instance.failed",
        instance = %instance,
        category = error.category(),
        error = %error,
    );
}

pub(crate) fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_spans_nest() {
        let _pass = PassSpan::enter("pass-1", "fleet");
        let _instance = InstanceSpan::enter("a");
    }

    #[traced_test]
    #[test]
    fn test_instance_failed_is_warning() {
        emit_instance_failed(
            "a",
            &NodeAgentError::ConfigurationConflict("both variants".into()),
        );
        assert!(logs_contain("instance.failed"));
        assert!(logs_contain("configuration_conflict"));
    }

    #[traced_test]
    #[test]
    fn test_requeue_event_carries_factory() {
        emit_instance_requeued("a", "daemon_set", &RequeueHint::immediate());
        assert!(logs_contain("instance.requeued"));
        assert!(logs_contain("daemon_set"));
    }
}
