//! Node Agent Core Library
//!
//! Resolves per-node logging agent configuration through layered defaults
//! and reconciles each named instance through an ordered sequence of
//! resource factories.

pub mod config_render;
pub mod defaults;
pub mod domain;
pub mod fakes;
pub mod merge;
pub mod metrics;
pub mod naming;
pub mod obs;
pub mod reconcile;
pub mod resolve;
pub mod resources;
pub mod telemetry;

pub use domain::{
    AgentVariant, CollaboratorError, DesiredState, EffectiveAgentSpec, FleetError,
    FleetLoggingContext, FluentbitSpec, InstanceFailure, ManagedResourceDescriptor,
    NamedAgentSpec, NodeAgentError, NodeAgentResult, PlatformCapabilities, RawAgentConfig,
    ReconcileOutcome, RequeueHint, ResourceKind, SyslogNgSpec, VariantKind,
};

pub use config_render::{render, RenderedConfig};
pub use merge::{merge, merge_layers, MergeStrategy};
pub use naming::InstanceNames;
pub use reconcile::{
    CombinedResult, DriverState, FleetReconciler, InstanceDriver, InstanceOutcome,
    InstanceReport, InstanceStatus, ReplicaCountProvider, ResourceReconciler,
};
pub use resolve::{resolve, resolve_layers, ContextRewrite};
pub use resources::{FactoryContext, FactoryOutput, FactorySequence, ResourceFactory};
