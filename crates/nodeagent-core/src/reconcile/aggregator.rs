//! Fleet-level pass over every named agent instance.
//!
//! [`FleetReconciler`] runs the driver once per instance and folds the
//! outcomes into a [`CombinedResult`]. A failing instance is recorded and
//! never stops its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::Instrument;

use super::driver::{InstanceDriver, InstanceOutcome, InstanceStatus};
use super::traits::{ReplicaCountProvider, ResourceReconciler};
use crate::domain::{
    FleetError, FleetLoggingContext, InstanceFailure, NamedAgentSpec, NodeAgentError,
    RequeueHint,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::resources::FactorySequence;

/// Accumulated outcome of one fleet pass. Built fresh per pass.
#[derive(Debug)]
pub struct CombinedResult {
    pub pass_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Per-instance status, keyed by instance name.
    pub instances: BTreeMap<String, InstanceStatus>,
    /// Most urgent requeue across instances.
    pub requeue: Option<RequeueHint>,
    /// Every failed instance, in processing order.
    pub failures: Vec<InstanceFailure>,
}

impl CombinedResult {
    pub fn new(pass_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pass_id: pass_id.into(),
            started_at: now,
            finished_at: now,
            instances: BTreeMap::new(),
            requeue: None,
            failures: Vec::new(),
        }
    }

    /// Fold one instance outcome in.
    pub fn combine(&mut self, instance: &str, outcome: InstanceOutcome) {
        self.instances.insert(instance.to_string(), outcome.status());
        match outcome {
            InstanceOutcome::Done => {}
            InstanceOutcome::Requeued(hint) => {
                self.requeue = Some(match self.requeue {
                    Some(current) => current.most_urgent(hint),
                    None => hint,
                });
            }
            InstanceOutcome::Failed(error) => self.failures.push(InstanceFailure {
                instance: instance.to_string(),
                error,
            }),
        }
    }

    pub fn status(&self, instance: &str) -> Option<&InstanceStatus> {
        self.instances.get(instance)
    }

    pub fn error_for(&self, instance: &str) -> Option<&NodeAgentError> {
        self.failures
            .iter()
            .find(|f| f.instance == instance)
            .map(|f| &f.error)
    }

    /// Every instance finished with nothing left to change.
    pub fn is_converged(&self) -> bool {
        self.requeue.is_none() && self.failures.is_empty()
    }

    pub fn done_count(&self) -> usize {
        self.count(|s| matches!(s, InstanceStatus::Done))
    }

    pub fn requeued_count(&self) -> usize {
        self.count(|s| matches!(s, InstanceStatus::Requeued { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    fn count(&self, pred: impl Fn(&InstanceStatus) -> bool) -> usize {
        self.instances.values().filter(|s| pred(s)).count()
    }

    /// The requeue hint, or every recorded failure.
    pub fn into_result(self) -> Result<Option<RequeueHint>, FleetError> {
        if self.failures.is_empty() {
            Ok(self.requeue)
        } else {
            Err(FleetError {
                failures: self.failures,
            })
        }
    }
}

/// Reconciles every named agent of one fleet.
pub struct FleetReconciler {
    fleet: FleetLoggingContext,
    agents: NamedAgentSpec,
    reconciler: Arc<dyn ResourceReconciler>,
    replicas: Arc<dyn ReplicaCountProvider>,
    factories: FactorySequence,
}

impl FleetReconciler {
    pub fn new(
        fleet: FleetLoggingContext,
        agents: NamedAgentSpec,
        reconciler: Arc<dyn ResourceReconciler>,
        replicas: Arc<dyn ReplicaCountProvider>,
    ) -> Self {
        Self {
            fleet,
            agents,
            reconciler,
            replicas,
            factories: FactorySequence::builtin(),
        }
    }

    /// Replace the built-in factory sequence.
    pub fn with_factories(mut self, factories: FactorySequence) -> Self {
        self.factories = factories;
        self
    }

    pub fn fleet(&self) -> &FleetLoggingContext {
        &self.fleet
    }

    pub fn agents(&self) -> &NamedAgentSpec {
        &self.agents
    }

    pub fn factories(&self) -> &FactorySequence {
        &self.factories
    }

    /// One level-triggered pass. Call again after any requeue.
    pub async fn reconcile(&self) -> CombinedResult {
        let pass_id = format!(
            "pass-{}",
            uuid::Uuid::new_v4()
                .to_string()
                .split('-')
                .next()
                .unwrap_or("x")
        );
        let span = obs::pass_span(&pass_id, &self.fleet.name);
        self.run_pass(pass_id).instrument(span).await
    }

    async fn run_pass(&self, pass_id: String) -> CombinedResult {
        let clock = Instant::now();
        obs::emit_pass_started(&pass_id, &self.fleet.name, self.agents.len());

        let mut combined = CombinedResult::new(pass_id);
        for (name, raw) in &self.agents {
            let report = InstanceDriver::new(
                &self.fleet,
                name,
                raw,
                &self.factories,
                self.reconciler.as_ref(),
                self.replicas.as_ref(),
            )
            .run()
            .await;
            combined.combine(name, report.outcome);
        }
        combined.finished_at = Utc::now();

        obs::emit_pass_finished(
            &combined.pass_id,
            obs::duration_ms(clock.elapsed()),
            combined.requeue.is_some(),
            combined.failures.len(),
        );
        METRICS.flush();
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_combine_keeps_most_urgent_requeue() {
        let mut combined = CombinedResult::new("p");
        combined.combine(
            "a",
            InstanceOutcome::Requeued(RequeueHint::after(Duration::from_secs(30))),
        );
        combined.combine(
            "b",
            InstanceOutcome::Requeued(RequeueHint::after(Duration::from_secs(10))),
        );
        combined.combine("c", InstanceOutcome::Done);
        assert_eq!(
            combined.requeue,
            Some(RequeueHint::after(Duration::from_secs(10)))
        );
        assert_eq!(combined.requeued_count(), 2);
        assert_eq!(combined.done_count(), 1);
        assert!(!combined.is_converged());
    }

    #[test]
    fn test_combine_keeps_every_failure() {
        let mut combined = CombinedResult::new("p");
        combined.combine(
            "a",
            InstanceOutcome::Failed(NodeAgentError::ConfigurationConflict("x".into())),
        );
        combined.combine("b", InstanceOutcome::Requeued(RequeueHint::immediate()));
        combined.combine(
            "c",
            InstanceOutcome::Failed(NodeAgentError::factory("daemon_set", "no image")),
        );
        assert_eq!(combined.failed_count(), 2);
        assert_eq!(
            combined.status("b"),
            Some(&InstanceStatus::Requeued {
                hint: RequeueHint::immediate()
            })
        );
        let err = combined.into_result().expect_err("failures");
        assert_eq!(err.instances(), vec!["a", "c"]);
    }

    #[test]
    fn test_into_result_without_failures() {
        let mut combined = CombinedResult::new("p");
        combined.combine("a", InstanceOutcome::Done);
        assert!(combined.is_converged());
        assert_eq!(combined.into_result().expect("ok"), None);
    }
}
