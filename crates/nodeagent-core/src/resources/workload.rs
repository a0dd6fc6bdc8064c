//! The per-node workload.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::{FactoryContext, FactoryOutput, ResourceFactory};
use crate::domain::{
    Container, ManagedResourceDescriptor, NodeAgentError, NodeAgentResult, ResourceKind,
    VariantKind,
};
use crate::merge::prune_nulls;

pub const CONFIG_CHECKSUM_ANNOTATION: &str = "checksum/config";
pub const METRICS_PORT_NAME: &str = "http-metrics";

pub struct DaemonSetFactory;

impl ResourceFactory for DaemonSetFactory {
    fn name(&self) -> &'static str {
        "daemon_set"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::DaemonSet
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        let effective = ctx.effective;
        let overrides = effective.daemon_set();
        let pod = &overrides.spec.template;

        let Some((primary, sidecars)) = pod.spec.containers.split_first() else {
            return Err(NodeAgentError::factory(self.name(), "no primary container"));
        };
        if primary.image.as_deref().map_or(true, str::is_empty) {
            return Err(NodeAgentError::factory(
                self.name(),
                "primary container has no image",
            ));
        }

        let mut containers = vec![self.primary_container(ctx, primary)?];
        for sidecar in sidecars {
            containers.push(to_manifest(sidecar)?);
        }

        let mut pod_labels = pod.metadata.labels.clone();
        pod_labels.extend(ctx.names.labels(effective));
        let mut pod_annotations = pod.metadata.annotations.clone();
        pod_annotations.insert(CONFIG_CHECKSUM_ANNOTATION.to_string(), ctx.config.checksum());

        let name = ctx.instance_name();
        let mut object = ctx.object(
            self.kind(),
            &name,
            json!({
                "spec": {
                    "selector": { "matchLabels": ctx.selector() },
                    "minReadySeconds": overrides.spec.min_ready_seconds,
                    "revisionHistoryLimit": overrides.spec.revision_history_limit,
                    "template": {
                        "metadata": {
                            "labels": pod_labels,
                            "annotations": pod_annotations,
                        },
                        "spec": {
                            "serviceAccountName": ctx.names.service_account(effective),
                            "containers": containers,
                            "volumes": volumes(ctx),
                            "nodeSelector": pod.spec.node_selector,
                            "tolerations": pod.spec.tolerations,
                            "affinity": pod.spec.affinity,
                            "priorityClassName": pod.spec.priority_class_name,
                            "hostNetwork": pod.spec.host_network,
                            "imagePullSecrets": pod.spec.image_pull_secrets,
                            "securityContext": effective.security().pod_security_context,
                        },
                    },
                },
            }),
        );

        if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
            let mut labels = overrides.metadata.labels.clone();
            labels.extend(ctx.names.labels(effective));
            meta.insert("labels".into(), json!(labels));
            if !overrides.metadata.annotations.is_empty() {
                meta.insert("annotations".into(), json!(overrides.metadata.annotations));
            }
        }
        prune_nulls(&mut object);

        Ok(FactoryOutput::Desired(ManagedResourceDescriptor::present(
            self.kind(),
            object,
        )))
    }
}

impl DaemonSetFactory {
    fn primary_container(
        &self,
        ctx: &FactoryContext<'_>,
        container: &Container,
    ) -> NodeAgentResult<Value> {
        let kind = ctx.effective.kind();
        let mut manifest = to_manifest(container)?;
        if container.name.is_empty() {
            manifest["name"] = json!(kind.container_name());
        }

        let mut mounts = container.volume_mounts.clone();
        mounts.extend(
            mount_points(ctx)
                .into_iter()
                .map(|(name, path)| json!({ "name": name, "mountPath": path })),
        );
        manifest["volumeMounts"] = Value::Array(mounts);

        if let Some(port) = ctx.effective.metrics().and_then(|m| m.port) {
            manifest["ports"] = json!([{
                "name": METRICS_PORT_NAME,
                "containerPort": port,
                "protocol": "TCP",
            }]);
        }
        if let Some(security_context) = &ctx.effective.security().security_context {
            manifest["securityContext"] = security_context.clone();
        }
        Ok(manifest)
    }
}

fn to_manifest(container: &Container) -> NodeAgentResult<Value> {
    let mut value = serde_json::to_value(container)?;
    prune_nulls(&mut value);
    Ok(value)
}

/// Volume name → mount path inside the primary container.
fn mount_points(ctx: &FactoryContext<'_>) -> BTreeMap<&'static str, String> {
    let effective = ctx.effective;
    let kind = effective.kind();
    let mut mounts = BTreeMap::new();
    mounts.insert("config", kind.config_mount_path().to_string());
    if let Some(path) = effective.var_logs_path() {
        mounts.insert("varlogs", path.to_string());
    }
    if let Some(path) = effective.containers_path() {
        mounts.insert("containers", path.to_string());
    }
    if let Some(path) = effective.buffer_storage_path() {
        mounts.insert("buffers", path.to_string());
    }
    if kind == VariantKind::Fluentbit {
        mounts.insert("positiondb", "/tail-db".to_string());
    }
    mounts
}

fn volumes(ctx: &FactoryContext<'_>) -> Vec<Value> {
    let effective = ctx.effective;
    let mut volumes = vec![json!({
        "name": "config",
        "secret": { "secretName": ctx.instance_name() },
    })];
    for (name, path) in [
        ("varlogs", effective.var_logs_path()),
        ("containers", effective.containers_path()),
    ] {
        if let Some(path) = path {
            volumes.push(json!({ "name": name, "hostPath": { "path": path } }));
        }
    }
    if effective.buffer_storage_path().is_some() {
        volumes.push(json!({ "name": "buffers", "emptyDir": {} }));
    }
    if effective.kind() == VariantKind::Fluentbit {
        volumes.push(json!({ "name": "positiondb", "emptyDir": {} }));
    }
    volumes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FleetLoggingContext, FluentbitSpec, Metrics, RawAgentConfig, SyslogNgSpec};
    use crate::resources::test_support::{desired, Fixture};

    fn fleet() -> FleetLoggingContext {
        FleetLoggingContext::new("fleet", "logging")
    }

    #[test]
    fn test_daemon_set_shape() {
        let fx = Fixture::new(fleet(), RawAgentConfig::fluentbit(FluentbitSpec::default()));
        let d = desired(DaemonSetFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.name(), Some("fleet-agent-fluentbit"));

        let spec = &d.object["spec"];
        assert_eq!(spec["selector"]["matchLabels"]["app.kubernetes.io/name"], "fluentbit");
        let pod = &spec["template"]["spec"];
        assert_eq!(pod["serviceAccountName"], "fleet-agent-fluentbit");
        assert_eq!(pod["containers"][0]["image"], "fluent/fluent-bit:1.9.10");
        assert_eq!(pod["containers"][0]["ports"][0]["containerPort"], 2020);
        assert_eq!(pod["containers"][0]["livenessProbe"]["httpGet"]["path"], "/");
        assert!(pod.get("affinity").is_none());

        let mounts = pod["containers"][0]["volumeMounts"]
            .as_array()
            .expect("mounts");
        assert!(mounts.iter().any(|m| m["mountPath"] == "/fluent-bit/conf_operator"));
    }

    #[test]
    fn test_checksum_annotation_matches_config() {
        let fx = Fixture::new(fleet(), RawAgentConfig::fluentbit(FluentbitSpec::default()));
        let d = desired(DaemonSetFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(
            d.object["spec"]["template"]["metadata"]["annotations"][CONFIG_CHECKSUM_ANNOTATION],
            fx.config.checksum()
        );
    }

    #[test]
    fn test_prometheus_annotations_reach_pod_template() {
        let mut spec = SyslogNgSpec {
            metrics: Some(Metrics {
                prometheus_annotations: Some(true),
                ..Metrics::default()
            }),
            ..SyslogNgSpec::default()
        };
        spec.daemon_set_overrides
            .spec
            .template
            .metadata
            .annotations
            .insert("team".into(), "obs".into());
        let fx = Fixture::new(fleet(), RawAgentConfig::syslog_ng(spec));
        let d = desired(DaemonSetFactory.build(&fx.ctx()).expect("build"));
        let annotations = &d.object["spec"]["template"]["metadata"]["annotations"];
        assert_eq!(annotations["prometheus.io/scrape"], "true");
        assert_eq!(annotations["prometheus.io/port"], "9577");
        assert_eq!(annotations["team"], "obs");
    }

    #[test]
    fn test_missing_image_is_factory_failure() {
        let mut spec = FluentbitSpec::default();
        spec.daemon_set_overrides.spec.template.spec.containers = vec![Container {
            name: "fluent-bit".into(),
            ..Container::default()
        }];
        let fx = Fixture::new(fleet(), RawAgentConfig::fluentbit(spec));
        match DaemonSetFactory.build(&fx.ctx()) {
            Err(NodeAgentError::FactoryFailure { factory, reason }) => {
                assert_eq!(factory, "daemon_set");
                assert!(reason.contains("image"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
