//! Rendering of the agent configuration files carried by the config secret.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::defaults::{FLUENTD_FORWARD_PORT, SYSLOG_NG_AGGREGATOR_PORT};
use crate::domain::{
    AgentVariant, EffectiveAgentSpec, FleetLoggingContext, FluentbitSpec, SyslogNgSpec,
};
use crate::naming::InstanceNames;

pub const UPSTREAM_CONFIG_KEY: &str = "upstream.conf";

/// File name → contents, in the order they land in the secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedConfig {
    pub files: BTreeMap<String, String>,
}

impl RenderedConfig {
    /// SHA-256 over every file name and body, hex encoded.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, body) in &self.files {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            hasher.update(body.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Render the configuration for `effective`. `aggregator_replicas` is only
/// read by the forwarder variant.
pub fn render(
    effective: &EffectiveAgentSpec,
    names: &InstanceNames<'_>,
    fleet: &FleetLoggingContext,
    aggregator_replicas: i32,
) -> RenderedConfig {
    let key = effective.kind().config_key().to_string();
    let mut files = BTreeMap::new();
    match &effective.variant {
        AgentVariant::Fluentbit(spec) => {
            let upstream = (aggregator_replicas > 1)
                .then(|| render_upstream(names, fleet, aggregator_replicas));
            files.insert(
                key,
                render_fluent_bit(spec, names, fleet, upstream.is_some()),
            );
            if let Some(upstream) = upstream {
                files.insert(UPSTREAM_CONFIG_KEY.to_string(), upstream);
            }
        }
        AgentVariant::SyslogNg(spec) => {
            files.insert(key, render_syslog_ng(spec, names, fleet));
        }
    }
    RenderedConfig { files }
}

/// Address of the single aggregator service.
pub fn aggregator_host(
    names: &InstanceNames<'_>,
    fleet: &FleetLoggingContext,
    short: &str,
) -> String {
    format!(
        "{}.{}.svc{}",
        names.fleet_qualified_name(short),
        fleet.control_namespace,
        fleet.cluster_domain_suffix()
    )
}

struct Section {
    out: String,
}

impl Section {
    fn new(title: &str) -> Self {
        Self {
            out: format!("[{title}]\n"),
        }
    }

    fn entry(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.out.push_str(&format!("    {key:<20} {value}\n"));
        self
    }

    fn entry_opt<T: std::fmt::Display>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.entry(key, value),
            None => self,
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

fn render_fluent_bit(
    spec: &FluentbitSpec,
    names: &InstanceNames<'_>,
    fleet: &FleetLoggingContext,
    balanced: bool,
) -> String {
    let mut sections = Vec::new();

    let mut service = Section::new("SERVICE")
        .entry_opt("Flush", spec.flush)
        .entry_opt("Grace", spec.grace)
        .entry("Daemon", "Off")
        .entry_opt("Log_Level", spec.log_level.as_deref())
        .entry_opt("Coro_Stack_Size", spec.coro_stack_size)
        .entry_opt("storage.path", spec.buffer_storage.storage_path.as_deref());
    if let Some(metrics) = &spec.metrics {
        service = service
            .entry("HTTP_Server", "On")
            .entry("HTTP_Listen", "0.0.0.0")
            .entry_opt("HTTP_Port", metrics.port);
    }
    sections.push(service.finish());

    let tail = &spec.input_tail;
    sections.push(
        Section::new("INPUT")
            .entry("Name", "tail")
            .entry_opt("Path", tail.path.as_deref())
            .entry_opt("DB", tail.db.as_deref())
            .entry_opt("Mem_Buf_Limit", tail.mem_buf_limit.as_deref())
            .entry_opt("Refresh_Interval", tail.refresh_interval.as_deref())
            .entry_opt("Skip_Long_Lines", tail.skip_long_lines.as_deref())
            .entry_opt("Tag", tail.tag.as_deref())
            .finish(),
    );

    let kube = &spec.filter_kubernetes;
    sections.push(
        Section::new("FILTER")
            .entry("Name", "kubernetes")
            .entry_opt("Match", tail.tag.as_deref())
            .entry_opt("Kube_URL", kube.kube_url.as_deref())
            .entry_opt("Kube_CA_File", kube.kube_ca_file.as_deref())
            .entry_opt("Kube_Token_File", kube.kube_token_file.as_deref())
            .entry_opt("Kube_Tag_Prefix", kube.kube_tag_prefix.as_deref())
            .finish(),
    );

    if let Some(aws) = &spec.filter_aws {
        sections.push(
            Section::new("FILTER")
                .entry("Name", "aws")
                .entry_opt("Match", aws.match_pattern.as_deref())
                .entry_opt("imds_version", aws.imds_version.as_deref())
                .entry_opt("az", aws.az)
                .entry_opt("ec2_instance_id", aws.ec2_instance_id)
                .entry_opt("ec2_instance_type", aws.ec2_instance_type)
                .entry_opt("private_ip", aws.private_ip)
                .entry_opt("ami_id", aws.ami_id)
                .entry_opt("account_id", aws.account_id)
                .entry_opt("hostname", aws.hostname)
                .entry_opt("vpc_id", aws.vpc_id)
                .finish(),
        );
    }

    let output = Section::new("OUTPUT").entry("Name", "forward").entry("Match", "*");
    let output = if balanced {
        output.entry("Upstream", UPSTREAM_CONFIG_KEY)
    } else {
        output
            .entry("Host", aggregator_host(names, fleet, "fluentd"))
            .entry("Port", FLUENTD_FORWARD_PORT)
    };
    sections.push(
        output
            .entry_opt("Retry_Limit", spec.forward_options.retry_limit.as_deref())
            .entry_opt(
                "Require_ack_response",
                spec.forward_options.require_ack_response,
            )
            .finish(),
    );

    sections.join("\n")
}

fn render_upstream(
    names: &InstanceNames<'_>,
    fleet: &FleetLoggingContext,
    replicas: i32,
) -> String {
    let fluentd = names.fleet_qualified_name("fluentd");
    let headless = names.fleet_qualified_name("fluentd-headless");
    let mut sections = vec![Section::new("UPSTREAM")
        .entry("Name", "forward-balancing")
        .finish()];
    for i in 0..replicas {
        sections.push(
            Section::new("NODE")
                .entry("Name", format!("{fluentd}-{i}"))
                .entry(
                    "Host",
                    format!(
                        "{fluentd}-{i}.{headless}.{}.svc{}",
                        fleet.control_namespace,
                        fleet.cluster_domain_suffix()
                    ),
                )
                .entry("Port", FLUENTD_FORWARD_PORT)
                .finish(),
        );
    }
    sections.join("\n")
}

fn render_syslog_ng(
    spec: &SyslogNgSpec,
    names: &InstanceNames<'_>,
    fleet: &FleetLoggingContext,
) -> String {
    let var_logs = spec.var_logs_path.as_deref().unwrap_or("/var/log");
    let host = aggregator_host(names, fleet, "syslog-ng");
    let port = SYSLOG_NG_AGGREGATOR_PORT;
    format!(
        "@version: current\n\
         @include \"scl.conf\"\n\
         \n\
         source s_containers {{\n    \
             wildcard-file(base-dir(\"{var_logs}/containers\") filename-pattern(\"*.log\") flags(no-parse));\n\
         }};\n\
         \n\
         destination d_aggregator {{\n    \
             syslog(\"{host}\" transport(\"tcp\") port({port}));\n\
         }};\n\
         \n\
         log {{ source(s_containers); destination(d_aggregator); }};\n"
    )
}
