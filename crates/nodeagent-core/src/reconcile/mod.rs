//! Per-instance driver, fleet aggregator and the collaborator seams they
//! call through.

pub mod aggregator;
pub mod driver;
pub mod traits;

pub use aggregator::{CombinedResult, FleetReconciler};
pub use driver::{DriverState, InstanceDriver, InstanceOutcome, InstanceReport, InstanceStatus};
pub use traits::{ReplicaCountProvider, ResourceReconciler};
