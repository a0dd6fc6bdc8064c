//! Collaborator seams. Inject real control-plane clients in production and
//! the in-memory fakes in tests.

use async_trait::async_trait;

use crate::domain::{
    CollaboratorError, FleetLoggingContext, ManagedResourceDescriptor, RequeueHint,
};

/// Idempotent "make it so" primitive of the control plane.
///
/// Returns `Ok(None)` when the object already matches, `Ok(Some(hint))` when
/// a mutation was performed or is still pending, and `Err` only for
/// non-retryable failures. Timeouts and cancellation are the implementor's
/// concern.
#[async_trait]
pub trait ResourceReconciler: Send + Sync {
    async fn reconcile_resource(
        &self,
        descriptor: &ManagedResourceDescriptor,
    ) -> Result<Option<RequeueHint>, CollaboratorError>;
}

/// Reads the aggregator's replica count for config templating.
#[async_trait]
pub trait ReplicaCountProvider: Send + Sync {
    /// `Ok(None)` when the aggregator does not declare a count.
    async fn replica_count(
        &self,
        fleet: &FleetLoggingContext,
    ) -> Result<Option<i32>, CollaboratorError>;
}
