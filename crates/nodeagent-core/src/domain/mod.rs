//! Domain models for node agent reconciliation.
//!
//! - `FleetLoggingContext`: read-only parent configuration
//! - `RawAgentConfig` / `EffectiveAgentSpec`: user input and its resolved form
//! - `ManagedResourceDescriptor`: what each resource factory emits

pub mod agent;
pub mod error;
pub mod fleet;
pub mod resource;
pub mod workload;

pub use agent::{
    AgentVariant, BufferStorage, EffectiveAgentSpec, FilterAws, FilterKubernetes, FluentbitSpec,
    ForwardOptions, InputTail, Metrics, NamedAgentSpec, RawAgentConfig, Security, SyslogNgSpec,
    VariantKind, PROFILE_LINUX, PROFILE_WINDOWS,
};
pub use error::{
    CollaboratorError, FleetError, InstanceFailure, NodeAgentError, NodeAgentResult,
};
pub use fleet::{FleetLoggingContext, OwnerIdentity, PlatformCapabilities};
pub use resource::{
    DesiredState, ManagedResourceDescriptor, ReconcileOutcome, RequeueHint, ResourceKind,
};
pub use workload::{
    Container, DaemonSetOverrides, DaemonSetSpecOverrides, HttpGetAction, ObjectMetaOverrides,
    PodSpecOverrides, PodTemplateOverrides, Probe, ResourceRequirements,
};
