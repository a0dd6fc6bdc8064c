//! Per-instance reconcile driver.
//!
//! ```text
//! Resolving -> Rendering -> Walking{0} -> Walking{1} -> ... -> Done
//!     |            |            |
//!     v            v            +--(pending change)--> Requeued
//!   Failed       Failed         +--(error)-----------> Failed
//! ```
//!
//! At most one pending change is produced per pass; later factories are not
//! evaluated until the next pass.

use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use super::traits::{ReplicaCountProvider, ResourceReconciler};
use crate::config_render::{self, RenderedConfig};
use crate::domain::{
    EffectiveAgentSpec, FleetLoggingContext, NodeAgentError, RawAgentConfig, ReconcileOutcome,
    RequeueHint, VariantKind,
};
use crate::metrics::METRICS;
use crate::naming::InstanceNames;
use crate::obs;
use crate::resolve::resolve;
use crate::resources::{FactoryContext, FactoryOutput, FactorySequence};

/// Driver state. `Done`, `Requeued` and `Failed` are terminal.
#[derive(Debug)]
pub enum DriverState {
    Resolving,
    Rendering {
        effective: EffectiveAgentSpec,
    },
    Walking {
        effective: EffectiveAgentSpec,
        config: RenderedConfig,
        index: usize,
    },
    Done,
    Requeued {
        factory: &'static str,
        hint: RequeueHint,
    },
    Failed(NodeAgentError),
}

impl DriverState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DriverState::Done | DriverState::Requeued { .. } | DriverState::Failed(_)
        )
    }
}

/// Terminal result of one instance's pass.
#[derive(Debug)]
pub enum InstanceOutcome {
    Done,
    Requeued(RequeueHint),
    Failed(NodeAgentError),
}

/// Error-free view of an [`InstanceOutcome`], for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum InstanceStatus {
    Done,
    Requeued { hint: RequeueHint },
    Failed,
}

impl InstanceOutcome {
    pub fn status(&self) -> InstanceStatus {
        match self {
            InstanceOutcome::Done => InstanceStatus::Done,
            InstanceOutcome::Requeued(hint) => InstanceStatus::Requeued { hint: *hint },
            InstanceOutcome::Failed(_) => InstanceStatus::Failed,
        }
    }
}

/// What one driver run did.
#[derive(Debug)]
pub struct InstanceReport {
    pub instance: String,
    pub outcome: InstanceOutcome,
    /// Descriptors handed to the reconciler this pass.
    pub submitted: usize,
    /// Factory whose descriptor reported the pending change.
    pub requeued_by: Option<&'static str>,
}

/// Drives one named instance through resolve, render and the factory walk.
pub struct InstanceDriver<'a> {
    fleet: &'a FleetLoggingContext,
    instance: &'a str,
    raw: &'a RawAgentConfig,
    factories: &'a FactorySequence,
    reconciler: &'a dyn ResourceReconciler,
    replicas: &'a dyn ReplicaCountProvider,
}

impl<'a> InstanceDriver<'a> {
    pub fn new(
        fleet: &'a FleetLoggingContext,
        instance: &'a str,
        raw: &'a RawAgentConfig,
        factories: &'a FactorySequence,
        reconciler: &'a dyn ResourceReconciler,
        replicas: &'a dyn ReplicaCountProvider,
    ) -> Self {
        Self {
            fleet,
            instance,
            raw,
            factories,
            reconciler,
            replicas,
        }
    }

    /// Run until a terminal state.
    pub async fn run(&self) -> InstanceReport {
        self.drive().instrument(obs::instance_span(self.instance)).await
    }

    async fn drive(&self) -> InstanceReport {
        let mut state = DriverState::Resolving;
        let mut submitted = 0;
        while !state.is_terminal() {
            state = self.step(state, &mut submitted).await;
        }

        let (outcome, requeued_by) = match state {
            DriverState::Requeued { factory, hint } => {
                obs::emit_instance_requeued(self.instance, factory, &hint);
                METRICS.inc_requeues();
                (InstanceOutcome::Requeued(hint), Some(factory))
            }
            DriverState::Failed(error) => {
                obs::emit_instance_failed(self.instance, &error);
                METRICS.inc_failures();
                (InstanceOutcome::Failed(error), None)
            }
            _ => (InstanceOutcome::Done, None),
        };
        METRICS.inc_instances_reconciled();

        InstanceReport {
            instance: self.instance.to_string(),
            outcome,
            submitted,
            requeued_by,
        }
    }

    /// One transition.
    pub async fn step(&self, state: DriverState, submitted: &mut usize) -> DriverState {
        match state {
            DriverState::Resolving => match resolve(self.raw, self.fleet) {
                Ok(effective) => {
                    obs::emit_instance_resolved(
                        self.instance,
                        effective.kind().short_name(),
                        effective.profile.as_deref(),
                    );
                    DriverState::Rendering { effective }
                }
                Err(error) => DriverState::Failed(error),
            },
            DriverState::Rendering { effective } => {
                let replicas = match effective.kind() {
                    VariantKind::Fluentbit => {
                        match self.replicas.replica_count(self.fleet).await {
                            Ok(count) => count.unwrap_or(1),
                            Err(source) => {
                                return DriverState::Failed(NodeAgentError::DataProvider {
                                    source,
                                })
                            }
                        }
                    }
                    VariantKind::SyslogNg => 1,
                };
                let names = InstanceNames::new(self.fleet, self.instance);
                let config = config_render::render(&effective, &names, self.fleet, replicas);
                DriverState::Walking {
                    effective,
                    config,
                    index: 0,
                }
            }
            DriverState::Walking {
                effective,
                config,
                index,
            } => self.walk(effective, config, index, submitted).await,
            terminal => terminal,
        }
    }

    async fn walk(
        &self,
        effective: EffectiveAgentSpec,
        config: RenderedConfig,
        index: usize,
        submitted: &mut usize,
    ) -> DriverState {
        let Some(factory) = self.factories.iter().nth(index) else {
            return DriverState::Done;
        };
        let next = index + 1;

        let ctx = FactoryContext::new(self.fleet, self.instance, &effective, &config);
        let descriptor = match factory.build(&ctx) {
            Ok(FactoryOutput::Desired(descriptor)) => descriptor,
            Ok(FactoryOutput::NotApplicable) => {
                debug!(factory = factory.name(), "factory not applicable");
                return DriverState::Walking {
                    effective,
                    config,
                    index: next,
                };
            }
            Err(error) => return DriverState::Failed(error.attributed_to(factory.name())),
        };
        let Some(name) = descriptor.name().map(str::to_string) else {
            return DriverState::Failed(NodeAgentError::factory(
                factory.name(),
                format!("{} descriptor has no name", descriptor.kind),
            ));
        };

        *submitted += 1;
        METRICS.inc_resources_submitted();
        let result = self.reconciler.reconcile_resource(&descriptor).await;
        match ReconcileOutcome::from(result) {
            ReconcileOutcome::NoChangeNeeded => {
                obs::emit_resource_reconciled(
                    self.instance,
                    descriptor.kind,
                    &name,
                    descriptor.state,
                    false,
                );
                DriverState::Walking {
                    effective,
                    config,
                    index: next,
                }
            }
            ReconcileOutcome::PendingChange(hint) => {
                obs::emit_resource_reconciled(
                    self.instance,
                    descriptor.kind,
                    &name,
                    descriptor.state,
                    true,
                );
                DriverState::Requeued {
                    factory: factory.name(),
                    hint,
                }
            }
            ReconcileOutcome::Failed(source) => {
                DriverState::Failed(NodeAgentError::ReconcileFailure {
                    kind: descriptor.kind,
                    name,
                    source,
                })
            }
        }
    }
}
