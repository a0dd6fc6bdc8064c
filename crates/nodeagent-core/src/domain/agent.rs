//! Agent configuration: the raw user input, the validated variant, and the
//! fully resolved effective specification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{NodeAgentError, NodeAgentResult};
use super::workload::{Container, DaemonSetOverrides, ObjectMetaOverrides};

/// Profile name that selects the Windows overlay.
pub const PROFILE_WINDOWS: &str = "windows";
/// Profile name for the (empty) Linux overlay.
pub const PROFILE_LINUX: &str = "linux";

/// Instance name → raw configuration, one entry per independently named agent.
pub type NamedAgentSpec = BTreeMap<String, RawAgentConfig>;

/// User-supplied configuration for one agent instance.
///
/// At most one of the variant fields may be populated; [`RawAgentConfig::variant`]
/// enforces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAgentConfig {
    pub profile: Option<String>,
    pub metadata: ObjectMetaOverrides,
    pub fluentbit_spec: Option<FluentbitSpec>,
    pub syslog_ng_spec: Option<SyslogNgSpec>,
}

impl RawAgentConfig {
    pub fn fluentbit(spec: FluentbitSpec) -> Self {
        Self {
            fluentbit_spec: Some(spec),
            ..Self::default()
        }
    }

    pub fn syslog_ng(spec: SyslogNgSpec) -> Self {
        Self {
            syslog_ng_spec: Some(spec),
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Validate exclusivity and return the single populated variant.
    pub fn variant(&self) -> NodeAgentResult<AgentVariant> {
        match (&self.fluentbit_spec, &self.syslog_ng_spec) {
            (Some(_), Some(_)) => Err(NodeAgentError::ConfigurationConflict(
                "only one agent implementation can be specified for a single node agent"
                    .to_string(),
            )),
            (Some(fb), None) => Ok(AgentVariant::Fluentbit(fb.clone())),
            (None, Some(sng)) => Ok(AgentVariant::SyslogNg(sng.clone())),
            (None, None) => Err(NodeAgentError::ConfigurationConflict(
                "no agent implementation specified".to_string(),
            )),
        }
    }

    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or("")
    }
}

/// Which per-node agent implementation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Fluentbit,
    SyslogNg,
}

impl VariantKind {
    /// Short name used for generated object names and the `name` label.
    pub fn short_name(&self) -> &'static str {
        match self {
            VariantKind::Fluentbit => "fluentbit",
            VariantKind::SyslogNg => "syslog-ng",
        }
    }

    pub fn container_name(&self) -> &'static str {
        match self {
            VariantKind::Fluentbit => "fluent-bit",
            VariantKind::SyslogNg => "syslog-ng",
        }
    }

    /// Key of the rendered configuration inside the config secret.
    pub fn config_key(&self) -> &'static str {
        match self {
            VariantKind::Fluentbit => "fluent-bit.conf",
            VariantKind::SyslogNg => "syslog-ng.conf",
        }
    }

    /// Directory the config secret is mounted at inside the primary container.
    pub fn config_mount_path(&self) -> &'static str {
        match self {
            VariantKind::Fluentbit => "/fluent-bit/conf_operator",
            VariantKind::SyslogNg => "/etc/syslog-ng/config",
        }
    }
}

/// The validated tagged union: exactly one implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec", rename_all = "snake_case")]
pub enum AgentVariant {
    Fluentbit(FluentbitSpec),
    SyslogNg(SyslogNgSpec),
}

impl AgentVariant {
    pub fn kind(&self) -> VariantKind {
        match self {
            AgentVariant::Fluentbit(_) => VariantKind::Fluentbit,
            AgentVariant::SyslogNg(_) => VariantKind::SyslogNg,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FluentbitSpec {
    pub daemon_set_overrides: DaemonSetOverrides,
    pub flush: Option<u32>,
    pub grace: Option<u32>,
    pub log_level: Option<String>,
    pub coro_stack_size: Option<u32>,
    pub input_tail: InputTail,
    pub filter_kubernetes: FilterKubernetes,
    pub filter_aws: Option<FilterAws>,
    pub security: Security,
    pub containers_path: Option<String>,
    pub var_logs_path: Option<String>,
    pub buffer_storage: BufferStorage,
    pub forward_options: ForwardOptions,
    pub metrics: Option<Metrics>,
    /// Synthesize a liveness probe even without a metrics block.
    pub liveness_default_check: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyslogNgSpec {
    pub daemon_set_overrides: DaemonSetOverrides,
    pub security: Security,
    pub containers_path: Option<String>,
    pub var_logs_path: Option<String>,
    pub buffer_storage: BufferStorage,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputTail {
    pub path: Option<String>,
    pub refresh_interval: Option<String>,
    pub skip_long_lines: Option<String>,
    pub db: Option<String>,
    pub mem_buf_limit: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterKubernetes {
    pub kube_url: Option<String>,
    pub kube_ca_file: Option<String>,
    pub kube_token_file: Option<String>,
    pub kube_tag_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterAws {
    pub imds_version: Option<String>,
    pub az: Option<bool>,
    pub ec2_instance_id: Option<bool>,
    pub ec2_instance_type: Option<bool>,
    pub private_ip: Option<bool>,
    pub ami_id: Option<bool>,
    pub account_id: Option<bool>,
    pub hostname: Option<bool>,
    pub vpc_id: Option<bool>,
    #[serde(rename = "match")]
    pub match_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Security {
    pub service_account: Option<String>,
    pub role_based_access_control_create: Option<bool>,
    pub pod_security_policy_create: Option<bool>,
    pub security_context: Option<serde_json::Value>,
    pub pod_security_context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferStorage {
    pub storage_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwardOptions {
    pub retry_limit: Option<String>,
    pub require_ack_response: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metrics {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub port: Option<i32>,
    pub path: Option<String>,
    pub prometheus_annotations: Option<bool>,
    pub service_monitor: Option<bool>,
    pub service_monitor_labels: BTreeMap<String, String>,
}

/// The resolved specification every factory reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveAgentSpec {
    pub profile: Option<String>,
    pub metadata: ObjectMetaOverrides,
    pub variant: AgentVariant,
}

impl EffectiveAgentSpec {
    pub fn kind(&self) -> VariantKind {
        self.variant.kind()
    }

    pub fn is_windows(&self) -> bool {
        self.profile.as_deref() == Some(PROFILE_WINDOWS)
    }

    pub fn fluentbit(&self) -> Option<&FluentbitSpec> {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => Some(spec),
            AgentVariant::SyslogNg(_) => None,
        }
    }

    pub fn syslog_ng(&self) -> Option<&SyslogNgSpec> {
        match &self.variant {
            AgentVariant::SyslogNg(spec) => Some(spec),
            AgentVariant::Fluentbit(_) => None,
        }
    }

    pub fn daemon_set(&self) -> &DaemonSetOverrides {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => &spec.daemon_set_overrides,
            AgentVariant::SyslogNg(spec) => &spec.daemon_set_overrides,
        }
    }

    pub fn primary_container(&self) -> Option<&Container> {
        self.daemon_set().spec.template.spec.containers.first()
    }

    pub fn security(&self) -> &Security {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => &spec.security,
            AgentVariant::SyslogNg(spec) => &spec.security,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => spec.metrics.as_ref(),
            AgentVariant::SyslogNg(spec) => spec.metrics.as_ref(),
        }
    }

    pub fn containers_path(&self) -> Option<&str> {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => spec.containers_path.as_deref(),
            AgentVariant::SyslogNg(spec) => spec.containers_path.as_deref(),
        }
    }

    pub fn var_logs_path(&self) -> Option<&str> {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => spec.var_logs_path.as_deref(),
            AgentVariant::SyslogNg(spec) => spec.var_logs_path.as_deref(),
        }
    }

    pub fn buffer_storage_path(&self) -> Option<&str> {
        match &self.variant {
            AgentVariant::Fluentbit(spec) => spec.buffer_storage.storage_path.as_deref(),
            AgentVariant::SyslogNg(spec) => spec.buffer_storage.storage_path.as_deref(),
        }
    }

    pub fn rbac_enabled(&self) -> bool {
        self.security()
            .role_based_access_control_create
            .unwrap_or(false)
    }

    pub fn psp_enabled(&self) -> bool {
        self.rbac_enabled() && self.security().pod_security_policy_create.unwrap_or(false)
    }

    /// User-declared service account, if any.
    pub fn declared_service_account(&self) -> Option<&str> {
        self.security()
            .service_account
            .as_deref()
            .filter(|sa| !sa.is_empty())
    }
}
