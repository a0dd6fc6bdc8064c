//! Typed override schema for the per-node workload.
//!
//! Scalars are `Option` so that "unset" is distinguishable from an explicit
//! value; sequences and mappings use empty as unset. Opaque control-plane
//! structures (tolerations, affinity, security contexts) stay as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMetaOverrides {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonSetOverrides {
    pub metadata: ObjectMetaOverrides,
    pub spec: DaemonSetSpecOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonSetSpecOverrides {
    pub min_ready_seconds: Option<i32>,
    pub revision_history_limit: Option<i32>,
    pub template: PodTemplateOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodTemplateOverrides {
    pub metadata: ObjectMetaOverrides,
    pub spec: PodSpecOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSpecOverrides {
    /// The first entry is the agent's primary container.
    pub containers: Vec<Container>,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Value>,
    pub affinity: Option<Value>,
    pub priority_class_name: Option<String>,
    pub host_network: Option<bool>,
    pub image_pull_secrets: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub name: String,
    pub image: Option<String>,
    pub image_pull_policy: Option<String>,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<Value>,
    pub resources: ResourceRequirements,
    pub liveness_probe: Option<Probe>,
    pub volume_mounts: Vec<Value>,
}

/// Quantities are kept in their string form (`100M`, `200m`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRequirements {
    pub limits: BTreeMap<String, String>,
    pub requests: BTreeMap<String, String>,
}

impl ResourceRequirements {
    pub fn new(limits: [(&str, &str); 2], requests: [(&str, &str); 2]) -> Self {
        let to_map = |pairs: [(&str, &str); 2]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self {
            limits: to_map(limits),
            requests: to_map(requests),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Probe {
    pub http_get: Option<HttpGetAction>,
    pub initial_delay_seconds: Option<i32>,
    pub timeout_seconds: Option<i32>,
    pub period_seconds: Option<i32>,
    pub success_threshold: Option<i32>,
    pub failure_threshold: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpGetAction {
    pub path: Option<String>,
    pub port: Option<i32>,
}
