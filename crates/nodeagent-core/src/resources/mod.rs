//! Resource factories.
//!
//! A [`FactorySequence`] maps one [`EffectiveAgentSpec`] to an ordered list of
//! desired objects. Order is reconciliation priority: identity and
//! permissions come before the workload that needs them.

pub mod config;
pub mod monitoring;
pub mod rbac;
pub mod workload;

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::config_render::RenderedConfig;
use crate::domain::{
    EffectiveAgentSpec, FleetLoggingContext, ManagedResourceDescriptor, NodeAgentResult,
    ResourceKind,
};
use crate::naming::InstanceNames;

/// Everything a factory may read. Nothing here is mutable.
#[derive(Debug, Clone, Copy)]
pub struct FactoryContext<'a> {
    pub fleet: &'a FleetLoggingContext,
    pub names: InstanceNames<'a>,
    pub effective: &'a EffectiveAgentSpec,
    pub config: &'a RenderedConfig,
}

impl<'a> FactoryContext<'a> {
    pub fn new(
        fleet: &'a FleetLoggingContext,
        instance: &'a str,
        effective: &'a EffectiveAgentSpec,
        config: &'a RenderedConfig,
    ) -> Self {
        Self {
            fleet,
            names: InstanceNames::new(fleet, instance),
            effective,
            config,
        }
    }

    /// `<fleet>-<instance>-<variant>`: the name most objects of an instance share.
    pub fn instance_name(&self) -> String {
        self.names.qualified_name(self.effective.kind().short_name())
    }

    pub fn labels(&self) -> Value {
        json!(self.names.labels(self.effective))
    }

    pub fn selector(&self) -> Value {
        json!(self.names.selector_labels(self.effective.kind()))
    }

    /// Standard metadata: name, namespace for namespaced kinds, labels and
    /// owner references.
    pub fn metadata(&self, kind: ResourceKind, name: &str) -> Value {
        let mut meta = Map::new();
        meta.insert("name".into(), json!(name));
        if !kind.is_cluster_scoped() {
            meta.insert("namespace".into(), json!(self.fleet.control_namespace));
        }
        meta.insert("labels".into(), self.labels());
        if self.fleet.owner.is_some() {
            meta.insert("ownerReferences".into(), self.fleet.owner_references());
        }
        Value::Object(meta)
    }

    /// A full manifest: type header, metadata, then the top-level `body`
    /// fields.
    pub fn object(&self, kind: ResourceKind, name: &str, body: Value) -> Value {
        let mut object = Map::new();
        object.insert("apiVersion".into(), json!(kind.api_version()));
        object.insert("kind".into(), json!(kind.as_str()));
        object.insert("metadata".into(), self.metadata(kind, name));
        if let Value::Object(fields) = body {
            object.extend(fields);
        }
        Value::Object(object)
    }

    pub fn present(&self, kind: ResourceKind, name: &str, body: Value) -> FactoryOutput {
        FactoryOutput::Desired(ManagedResourceDescriptor::present(
            kind,
            self.object(kind, name, body),
        ))
    }

    /// Absent objects only need enough identity to be found and deleted.
    pub fn absent(&self, kind: ResourceKind, name: &str) -> FactoryOutput {
        let mut metadata = Map::new();
        metadata.insert("name".into(), json!(name));
        if !kind.is_cluster_scoped() {
            metadata.insert("namespace".into(), json!(self.fleet.control_namespace));
        }
        FactoryOutput::Desired(ManagedResourceDescriptor::absent(
            kind,
            json!({
                "apiVersion": kind.api_version(),
                "kind": kind.as_str(),
                "metadata": metadata,
            }),
        ))
    }
}

/// What a factory produced for one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryOutput {
    Desired(ManagedResourceDescriptor),
    /// The feature this factory manages does not exist on this platform.
    NotApplicable,
}

/// One step of the sequence. Implementations must be pure.
pub trait ResourceFactory: Send + Sync {
    /// Stable name used in diagnostics.
    fn name(&self) -> &'static str;

    fn kind(&self) -> ResourceKind;

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput>;
}

/// Ordered, fixed list of factories.
pub struct FactorySequence {
    factories: Vec<Box<dyn ResourceFactory>>,
}

impl FactorySequence {
    pub fn new(factories: Vec<Box<dyn ResourceFactory>>) -> Self {
        Self { factories }
    }

    /// Account, permissions, pod security policy, config, workload, metrics.
    pub fn builtin() -> Self {
        Self::new(vec![
            Box::new(rbac::ServiceAccountFactory),
            Box::new(rbac::ClusterRoleFactory),
            Box::new(rbac::ClusterRoleBindingFactory),
            Box::new(rbac::PodSecurityPolicyFactory),
            Box::new(rbac::PspClusterRoleFactory),
            Box::new(rbac::PspClusterRoleBindingFactory),
            Box::new(config::ConfigSecretFactory),
            Box::new(workload::DaemonSetFactory),
            Box::new(monitoring::MetricsServiceFactory),
            Box::new(monitoring::ServiceMonitorFactory),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ResourceFactory> {
        self.factories.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.name()).collect()
    }

    /// Kinds a host controller should watch for changes to owned objects.
    pub fn owned_kinds(&self) -> BTreeSet<ResourceKind> {
        self.iter().map(|f| f.kind()).collect()
    }

    /// Build every descriptor without submitting anything. Stops at the
    /// first factory error.
    pub fn plan(
        &self,
        ctx: &FactoryContext<'_>,
    ) -> NodeAgentResult<Vec<(&'static str, FactoryOutput)>> {
        self.iter()
            .map(|f| {
                f.build(ctx)
                    .map(|out| (f.name(), out))
                    .map_err(|e| e.attributed_to(f.name()))
            })
            .collect()
    }
}

impl Default for FactorySequence {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for FactorySequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorySequence")
            .field("factories", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config_render;
    use crate::domain::RawAgentConfig;
    use crate::resolve::resolve;

    pub struct Fixture {
        pub fleet: FleetLoggingContext,
        pub effective: EffectiveAgentSpec,
        pub config: RenderedConfig,
    }

    impl Fixture {
        pub fn new(fleet: FleetLoggingContext, raw: RawAgentConfig) -> Self {
            let effective = resolve(&raw, &fleet).expect("resolve");
            let names = InstanceNames::new(&fleet, "agent");
            let config = config_render::render(&effective, &names, &fleet, 1);
            Self {
                fleet,
                effective,
                config,
            }
        }

        pub fn ctx(&self) -> FactoryContext<'_> {
            FactoryContext::new(&self.fleet, "agent", &self.effective, &self.config)
        }
    }

    pub fn desired(output: FactoryOutput) -> ManagedResourceDescriptor {
        match output {
            FactoryOutput::Desired(d) => d,
            FactoryOutput::NotApplicable => panic!("expected a descriptor"),
        }
    }
}
