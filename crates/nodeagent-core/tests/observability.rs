//! Structured lifecycle events emitted during a fleet pass.

use std::sync::Arc;

use nodeagent_core::fakes::{FailingReplicaCount, ScriptedReconciler, StaticReplicaCount};
use nodeagent_core::obs::{emit_pass_finished, emit_pass_started, InstanceSpan, PassSpan};
use nodeagent_core::{FleetLoggingContext, FleetReconciler, FluentbitSpec, RawAgentConfig};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn pass_events_carry_pass_id() {
    let _pass = PassSpan::enter("pass-abc", "fleet");
    emit_pass_started("pass-abc", "fleet", 2);
    emit_pass_finished("pass-abc", 12, false, 0);
    assert!(logs_contain("pass.started"));
    assert!(logs_contain("pass.finished"));
    assert!(logs_contain("pass-abc"));
}

#[traced_test]
#[test]
fn instance_span_enters_without_panicking() {
    let span = InstanceSpan::enter("agent");
    drop(span);
}

#[traced_test]
#[tokio::test]
async fn requeued_pass_logs_factory() {
    let agents = [(
        "a".to_string(),
        RawAgentConfig::fluentbit(FluentbitSpec::default()),
    )]
    .into_iter()
    .collect();
    FleetReconciler::new(
        FleetLoggingContext::new("fleet", "logging"),
        agents,
        Arc::new(ScriptedReconciler::pending_at(
            1,
            nodeagent_core::RequeueHint::immediate(),
        )),
        Arc::new(StaticReplicaCount::new(Some(1))),
    )
    .reconcile()
    .await;

    assert!(logs_contain("instance.resolved"));
    assert!(logs_contain("resource.reconciled"));
    assert!(logs_contain("instance.requeued"));
    assert!(logs_contain("service_account"));
}

#[traced_test]
#[tokio::test]
async fn failed_instance_logs_warning() {
    let agents = [(
        "a".to_string(),
        RawAgentConfig::fluentbit(FluentbitSpec::default()),
    )]
    .into_iter()
    .collect();
    let result = FleetReconciler::new(
        FleetLoggingContext::new("fleet", "logging"),
        agents,
        Arc::new(ScriptedReconciler::converged()),
        Arc::new(FailingReplicaCount),
    )
    .reconcile()
    .await;

    assert_eq!(result.failed_count(), 1);
    assert!(logs_contain("instance.failed"));
    assert!(logs_contain("data_provider"));
}
