//! Built-in baselines and profile overlays.
//!
//! Every function returns a fresh value; nothing here is patched in place.

use std::collections::BTreeMap;

use crate::domain::{
    AgentVariant, BufferStorage, Container, DaemonSetOverrides, FilterAws, FilterKubernetes,
    FluentbitSpec, ForwardOptions, HttpGetAction, InputTail, Metrics, Probe, ResourceRequirements,
    Security, SyslogNgSpec, VariantKind, PROFILE_LINUX, PROFILE_WINDOWS,
};

pub const FLUENTBIT_METRICS_PORT: i32 = 2020;
pub const SYSLOG_NG_METRICS_PORT: i32 = 9577;
/// Port the syslog-ng aggregator listens on for node agents.
pub const SYSLOG_NG_AGGREGATOR_PORT: i32 = 601;
/// Forward port of the fluentd aggregator.
pub const FLUENTD_FORWARD_PORT: i32 = 24240;

pub const ANNOTATION_SCRAPE: &str = "prometheus.io/scrape";
pub const ANNOTATION_PATH: &str = "prometheus.io/path";
pub const ANNOTATION_PORT: &str = "prometheus.io/port";

const WINDOWS_NODE_SELECTOR: (&str, &str) = ("kubernetes.io/os", "windows");

/// Complete, self-consistent starting point for a variant.
pub fn baseline(kind: VariantKind) -> AgentVariant {
    match kind {
        VariantKind::Fluentbit => AgentVariant::Fluentbit(fluentbit_baseline()),
        VariantKind::SyslogNg => AgentVariant::SyslogNg(syslog_ng_baseline()),
    }
}

/// The overlay selected by `profile`, if any. Unknown profiles select none.
pub fn profile_overlay(kind: VariantKind, profile: &str) -> Option<AgentVariant> {
    match (kind, profile) {
        (VariantKind::Fluentbit, PROFILE_WINDOWS) => {
            Some(AgentVariant::Fluentbit(fluentbit_windows_overlay()))
        }
        (VariantKind::Fluentbit, PROFILE_LINUX) => {
            Some(AgentVariant::Fluentbit(FluentbitSpec::default()))
        }
        _ => None,
    }
}

pub fn fluentbit_baseline() -> FluentbitSpec {
    FluentbitSpec {
        daemon_set_overrides: daemon_set_with(Container {
            name: VariantKind::Fluentbit.container_name().to_string(),
            image: Some("fluent/fluent-bit:1.9.10".to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: strings(&[
                "/fluent-bit/bin/fluent-bit",
                "-c",
                "/fluent-bit/conf_operator/fluent-bit.conf",
            ]),
            resources: ResourceRequirements::new(
                [("memory", "100M"), ("cpu", "200m")],
                [("memory", "50M"), ("cpu", "100m")],
            ),
            ..Container::default()
        }),
        flush: Some(1),
        grace: Some(5),
        log_level: Some("info".to_string()),
        coro_stack_size: Some(24576),
        input_tail: InputTail {
            path: Some("/var/log/containers/*.log".to_string()),
            refresh_interval: Some("5".to_string()),
            skip_long_lines: Some("On".to_string()),
            db: Some("/tail-db/tail-containers-state.db".to_string()),
            mem_buf_limit: Some("5MB".to_string()),
            tag: Some("kubernetes.*".to_string()),
        },
        filter_kubernetes: FilterKubernetes::default(),
        filter_aws: None,
        security: rbac_security(),
        containers_path: Some("/var/lib/docker/containers".to_string()),
        var_logs_path: Some("/var/log".to_string()),
        buffer_storage: BufferStorage {
            storage_path: Some("/buffers".to_string()),
        },
        forward_options: ForwardOptions {
            retry_limit: Some("False".to_string()),
            require_ack_response: None,
        },
        metrics: None,
        liveness_default_check: None,
    }
}

pub fn syslog_ng_baseline() -> SyslogNgSpec {
    SyslogNgSpec {
        daemon_set_overrides: daemon_set_with(Container {
            name: VariantKind::SyslogNg.container_name().to_string(),
            image: Some("ghcr.io/axoflow/syslog-ng:4.1.1".to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            args: strings(&[
                "--cfgfile=/etc/syslog-ng/config/syslog-ng.conf",
                "--control=/tmp/syslog-ng/syslog-ng.ctl",
                "--no-caps",
                "-Fe",
            ]),
            resources: ResourceRequirements::new(
                [("memory", "400M"), ("cpu", "1000m")],
                [("memory", "100M"), ("cpu", "500m")],
            ),
            ..Container::default()
        }),
        security: rbac_security(),
        containers_path: Some("/var/lib/docker/containers".to_string()),
        var_logs_path: Some("/var/log".to_string()),
        buffer_storage: BufferStorage {
            storage_path: Some("/buffers".to_string()),
        },
        metrics: None,
    }
}

/// Windows nodes: paths, image, command and node placement are replaced.
/// The API URL set here is a placeholder; it is rewritten from fleet context.
pub fn fluentbit_windows_overlay() -> FluentbitSpec {
    let mut daemon_set = daemon_set_with(Container {
        name: VariantKind::Fluentbit.container_name().to_string(),
        image: Some("rancher/fluent-bit:1.6.10-rc7".to_string()),
        command: strings(&[
            "fluent-bit",
            "-c",
            "fluent-bit\\conf_operator\\fluent-bit.conf",
        ]),
        resources: ResourceRequirements::new(
            [("memory", "200M"), ("cpu", "200m")],
            [("memory", "100M"), ("cpu", "100m")],
        ),
        ..Container::default()
    });
    daemon_set.spec.template.spec.node_selector = BTreeMap::from([(
        WINDOWS_NODE_SELECTOR.0.to_string(),
        WINDOWS_NODE_SELECTOR.1.to_string(),
    )]);

    FluentbitSpec {
        daemon_set_overrides: daemon_set,
        filter_kubernetes: FilterKubernetes {
            kube_url: Some(windows_kube_url("")),
            kube_ca_file: Some(
                "c:\\var\\run\\secrets\\kubernetes.io\\serviceaccount\\ca.crt".to_string(),
            ),
            kube_token_file: Some(
                "c:\\var\\run\\secrets\\kubernetes.io\\serviceaccount\\token".to_string(),
            ),
            kube_tag_prefix: Some("kubernetes.C.var.log.containers.".to_string()),
        },
        input_tail: InputTail {
            path: Some("C:\\var\\log\\containers\\*.log".to_string()),
            ..InputTail::default()
        },
        containers_path: Some("C:\\ProgramData\\docker".to_string()),
        var_logs_path: Some("C:\\var\\log".to_string()),
        ..FluentbitSpec::default()
    }
}

/// In-cluster API endpoint for Windows nodes, which cannot use the
/// service-account environment.
pub fn windows_kube_url(cluster_domain_suffix: &str) -> String {
    format!("https://kubernetes.default.svc{cluster_domain_suffix}:443")
}

/// Defaults placed under a user-enabled AWS metadata filter.
pub fn aws_filter_defaults() -> FilterAws {
    FilterAws {
        imds_version: Some("v2".to_string()),
        az: Some(true),
        ec2_instance_id: Some(true),
        ec2_instance_type: Some(false),
        private_ip: Some(false),
        ami_id: Some(false),
        account_id: Some(false),
        hostname: Some(false),
        vpc_id: Some(false),
        match_pattern: Some("*".to_string()),
    }
}

/// Metrics endpoint that only backs the default liveness check.
pub fn fluentbit_liveness_metrics() -> Metrics {
    Metrics {
        port: Some(FLUENTBIT_METRICS_PORT),
        path: Some("/".to_string()),
        ..Metrics::default()
    }
}

/// Defaults placed under a user-supplied metrics block.
pub fn metrics_defaults(kind: VariantKind) -> Metrics {
    let (port, path) = match kind {
        VariantKind::Fluentbit => (FLUENTBIT_METRICS_PORT, "/api/v1/metrics/prometheus"),
        VariantKind::SyslogNg => (SYSLOG_NG_METRICS_PORT, "/metrics"),
    };
    Metrics {
        interval: Some("15s".to_string()),
        timeout: Some("5s".to_string()),
        port: Some(port),
        path: Some(path.to_string()),
        ..Metrics::default()
    }
}

/// The three scrape annotations for a resolved metrics endpoint.
pub fn prometheus_annotations(path: &str, port: i32) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ANNOTATION_SCRAPE.to_string(), "true".to_string()),
        (ANNOTATION_PATH.to_string(), path.to_string()),
        (ANNOTATION_PORT.to_string(), port.to_string()),
    ])
}

/// HTTP liveness check against the resolved metrics endpoint.
pub fn liveness_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(HttpGetAction {
            path: Some(path.to_string()),
            port: Some(port),
        }),
        initial_delay_seconds: Some(10),
        timeout_seconds: None,
        period_seconds: Some(10),
        success_threshold: None,
        failure_threshold: Some(3),
    }
}

fn daemon_set_with(container: Container) -> DaemonSetOverrides {
    let mut daemon_set = DaemonSetOverrides::default();
    daemon_set.spec.template.spec.containers = vec![container];
    daemon_set
}

fn rbac_security() -> Security {
    Security {
        role_based_access_control_create: Some(true),
        ..Security::default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
