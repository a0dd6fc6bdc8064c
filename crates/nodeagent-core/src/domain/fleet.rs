//! Fleet-wide logging context shared by every agent instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Optional control-plane features the factory sequence depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformCapabilities {
    /// The control plane still serves pod security policies.
    pub pod_security_policy: bool,
    /// The monitoring operator's service descriptor kind is installed.
    pub service_monitor: bool,
}

/// The parent logging configuration. Read-only for the duration of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetLoggingContext {
    /// Name of the owning fleet resource; prefixes every generated name.
    pub name: String,
    /// Namespace that receives namespaced objects.
    pub control_namespace: String,
    /// Cluster DNS domain, e.g. `cluster.local`.
    #[serde(default)]
    pub cluster_domain: Option<String>,
    /// Identity of the owning resource, used for owner references.
    #[serde(default)]
    pub owner: Option<OwnerIdentity>,
    /// Labels stamped onto every managed object.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub capabilities: PlatformCapabilities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerIdentity {
    pub api_version: String,
    pub kind: String,
    pub uid: String,
}

impl FleetLoggingContext {
    pub fn new(name: impl Into<String>, control_namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control_namespace: control_namespace.into(),
            cluster_domain: None,
            owner: None,
            labels: BTreeMap::new(),
            capabilities: PlatformCapabilities::default(),
        }
    }

    pub fn with_cluster_domain(mut self, domain: impl Into<String>) -> Self {
        self.cluster_domain = Some(domain.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_owner(mut self, owner: OwnerIdentity) -> Self {
        self.owner = Some(owner);
        self
    }

    /// `.<domain>` when a cluster domain is configured, otherwise empty.
    pub fn cluster_domain_suffix(&self) -> String {
        match self.cluster_domain.as_deref() {
            Some(domain) if !domain.is_empty() => format!(".{domain}"),
            _ => String::new(),
        }
    }

    /// Owner references for `metadata.ownerReferences`; empty without an owner.
    pub fn owner_references(&self) -> Value {
        match &self.owner {
            Some(owner) => json!([{
                "apiVersion": owner.api_version,
                "kind": owner.kind,
                "name": self.name,
                "uid": owner.uid,
                "controller": true,
                "blockOwnerDeletion": true,
            }]),
            None => json!([]),
        }
    }
}
