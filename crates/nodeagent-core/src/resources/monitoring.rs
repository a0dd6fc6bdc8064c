//! Metrics exposure: a headless service in front of the agents' metrics port
//! and the monitoring operator's scrape descriptor.

use serde_json::json;

use super::workload::METRICS_PORT_NAME;
use super::{FactoryContext, FactoryOutput, ResourceFactory};
use crate::domain::{NodeAgentResult, ResourceKind};
use crate::merge::prune_nulls;

fn metrics_service_name(ctx: &FactoryContext<'_>) -> String {
    ctx.names.qualified_name(&format!("{}-metrics", ctx.effective.kind().short_name()))
}

pub struct MetricsServiceFactory;

impl ResourceFactory for MetricsServiceFactory {
    fn name(&self) -> &'static str {
        "metrics_service"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        let name = metrics_service_name(ctx);
        let Some(port) = ctx.effective.metrics().and_then(|m| m.port) else {
            return Ok(ctx.absent(self.kind(), &name));
        };
        Ok(ctx.present(
            self.kind(),
            &name,
            json!({
                "spec": {
                    "clusterIP": "None",
                    "selector": ctx.selector(),
                    "ports": [{
                        "name": METRICS_PORT_NAME,
                        "port": port,
                        "targetPort": port,
                        "protocol": "TCP",
                    }],
                },
            }),
        ))
    }
}

pub struct ServiceMonitorFactory;

impl ResourceFactory for ServiceMonitorFactory {
    fn name(&self) -> &'static str {
        "service_monitor"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceMonitor
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        if !ctx.fleet.capabilities.service_monitor {
            return Ok(FactoryOutput::NotApplicable);
        }
        let name = metrics_service_name(ctx);
        let metrics = match ctx.effective.metrics() {
            Some(metrics) if metrics.service_monitor == Some(true) => metrics,
            _ => return Ok(ctx.absent(self.kind(), &name)),
        };

        let mut output = ctx.present(
            self.kind(),
            &name,
            json!({
                "spec": {
                    "selector": { "matchLabels": ctx.selector() },
                    "namespaceSelector": { "matchNames": [ctx.fleet.control_namespace] },
                    "endpoints": [{
                        "port": METRICS_PORT_NAME,
                        "path": metrics.path,
                        "interval": metrics.interval,
                        "scrapeTimeout": metrics.timeout,
                    }],
                },
            }),
        );

        if let FactoryOutput::Desired(descriptor) = &mut output {
            if let Some(labels) = descriptor
                .object
                .pointer_mut("/metadata/labels")
                .and_then(|v| v.as_object_mut())
            {
                for (key, value) in &metrics.service_monitor_labels {
                    labels.insert(key.clone(), json!(value));
                }
            }
            prune_nulls(&mut descriptor.object);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DesiredState, FleetLoggingContext, FluentbitSpec, Metrics, PlatformCapabilities,
        RawAgentConfig, SyslogNgSpec,
    };
    use crate::resources::test_support::{desired, Fixture};

    fn fleet(service_monitor: bool) -> FleetLoggingContext {
        FleetLoggingContext::new("fleet", "logging").with_capabilities(PlatformCapabilities {
            pod_security_policy: false,
            service_monitor,
        })
    }

    #[test]
    fn test_metrics_service_follows_resolved_port() {
        let fx = Fixture::new(fleet(false), RawAgentConfig::fluentbit(FluentbitSpec::default()));
        let d = desired(MetricsServiceFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Present);
        assert_eq!(d.name(), Some("fleet-agent-fluentbit-metrics"));
        assert_eq!(d.object["spec"]["ports"][0]["port"], 2020);
    }

    #[test]
    fn test_metrics_service_absent_without_metrics() {
        let fx = Fixture::new(fleet(false), RawAgentConfig::syslog_ng(SyslogNgSpec::default()));
        let d = desired(MetricsServiceFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Absent);
    }

    #[test]
    fn test_service_monitor_needs_capability() {
        let fx = Fixture::new(fleet(false), RawAgentConfig::fluentbit(FluentbitSpec::default()));
        assert_eq!(
            ServiceMonitorFactory.build(&fx.ctx()).expect("build"),
            FactoryOutput::NotApplicable
        );
    }

    #[test]
    fn test_service_monitor_present_when_requested() {
        let mut metrics = Metrics {
            service_monitor: Some(true),
            ..Metrics::default()
        };
        metrics
            .service_monitor_labels
            .insert("release".into(), "prometheus".into());
        let fx = Fixture::new(
            fleet(true),
            RawAgentConfig::fluentbit(FluentbitSpec {
                metrics: Some(metrics),
                ..FluentbitSpec::default()
            }),
        );
        let d = desired(ServiceMonitorFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Present);
        assert_eq!(d.object["metadata"]["labels"]["release"], "prometheus");
        let endpoint = &d.object["spec"]["endpoints"][0];
        assert_eq!(endpoint["path"], "/api/v1/metrics/prometheus");
        assert_eq!(endpoint["interval"], "15s");
    }

    #[test]
    fn test_service_monitor_absent_when_not_requested() {
        let fx = Fixture::new(fleet(true), RawAgentConfig::fluentbit(FluentbitSpec::default()));
        let d = desired(ServiceMonitorFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Absent);
    }
}
