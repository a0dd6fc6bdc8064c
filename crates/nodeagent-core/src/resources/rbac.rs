//! Identity and permission objects: service account, cluster role and
//! binding, and the optional pod security policy trio.

use serde_json::{json, Value};

use super::{FactoryContext, FactoryOutput, ResourceFactory};
use crate::domain::{NodeAgentResult, ResourceKind};

pub struct ServiceAccountFactory;

impl ResourceFactory for ServiceAccountFactory {
    fn name(&self) -> &'static str {
        "service_account"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceAccount
    }

    /// Only a generated account is managed; a declared one belongs to the user.
    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        let name = ctx.names.service_account(ctx.effective);
        if ctx.effective.rbac_enabled() && ctx.effective.declared_service_account().is_none() {
            Ok(ctx.present(self.kind(), &name, json!({})))
        } else {
            Ok(ctx.absent(self.kind(), &ctx.instance_name()))
        }
    }
}

pub struct ClusterRoleFactory;

impl ResourceFactory for ClusterRoleFactory {
    fn name(&self) -> &'static str {
        "cluster_role"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterRole
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        let name = ctx.instance_name();
        if !ctx.effective.rbac_enabled() {
            return Ok(ctx.absent(self.kind(), &name));
        }
        Ok(ctx.present(
            self.kind(),
            &name,
            json!({
                "rules": [{
                    "apiGroups": [""],
                    "resources": ["pods", "namespaces"],
                    "verbs": ["get", "list", "watch"],
                }],
            }),
        ))
    }
}

pub struct ClusterRoleBindingFactory;

impl ResourceFactory for ClusterRoleBindingFactory {
    fn name(&self) -> &'static str {
        "cluster_role_binding"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterRoleBinding
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        let name = ctx.instance_name();
        if !ctx.effective.rbac_enabled() {
            return Ok(ctx.absent(self.kind(), &name));
        }
        Ok(ctx.present(self.kind(), &name, binding_body(ctx, &name)))
    }
}

pub struct PodSecurityPolicyFactory;

impl ResourceFactory for PodSecurityPolicyFactory {
    fn name(&self) -> &'static str {
        "pod_security_policy"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::PodSecurityPolicy
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        if !ctx.fleet.capabilities.pod_security_policy {
            return Ok(FactoryOutput::NotApplicable);
        }
        let name = psp_name(ctx);
        if !ctx.effective.psp_enabled() {
            return Ok(ctx.absent(self.kind(), &name));
        }

        let host_paths: Vec<Value> = [
            ctx.effective.containers_path(),
            ctx.effective.var_logs_path(),
            ctx.effective.buffer_storage_path(),
        ]
        .into_iter()
        .flatten()
        .map(|path| json!({ "pathPrefix": path, "readOnly": false }))
        .collect();

        Ok(ctx.present(
            self.kind(),
            &name,
            json!({
                "spec": {
                    "privileged": false,
                    "allowPrivilegeEscalation": false,
                    "fsGroup": { "rule": "RunAsAny" },
                    "runAsUser": { "rule": "RunAsAny" },
                    "seLinux": { "rule": "RunAsAny" },
                    "supplementalGroups": { "rule": "RunAsAny" },
                    "volumes": ["configMap", "emptyDir", "secret", "hostPath"],
                    "allowedHostPaths": host_paths,
                },
            }),
        ))
    }
}

pub struct PspClusterRoleFactory;

impl ResourceFactory for PspClusterRoleFactory {
    fn name(&self) -> &'static str {
        "psp_cluster_role"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterRole
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        if !ctx.fleet.capabilities.pod_security_policy {
            return Ok(FactoryOutput::NotApplicable);
        }
        let name = psp_name(ctx);
        if !ctx.effective.psp_enabled() {
            return Ok(ctx.absent(self.kind(), &name));
        }
        Ok(ctx.present(
            self.kind(),
            &name,
            json!({
                "rules": [{
                    "apiGroups": ["policy"],
                    "resources": ["podsecuritypolicies"],
                    "resourceNames": [name],
                    "verbs": ["use"],
                }],
            }),
        ))
    }
}

pub struct PspClusterRoleBindingFactory;

impl ResourceFactory for PspClusterRoleBindingFactory {
    fn name(&self) -> &'static str {
        "psp_cluster_role_binding"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterRoleBinding
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        if !ctx.fleet.capabilities.pod_security_policy {
            return Ok(FactoryOutput::NotApplicable);
        }
        let name = psp_name(ctx);
        if !ctx.effective.psp_enabled() {
            return Ok(ctx.absent(self.kind(), &name));
        }
        Ok(ctx.present(self.kind(), &name, binding_body(ctx, &name)))
    }
}

fn psp_name(ctx: &FactoryContext<'_>) -> String {
    ctx.names.qualified_name(&format!("{}-psp", ctx.effective.kind().short_name()))
}

fn binding_body(ctx: &FactoryContext<'_>, role: &str) -> Value {
    json!({
        "roleRef": {
            "apiGroup": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": role,
        },
        "subjects": [{
            "kind": "ServiceAccount",
            "name": ctx.names.service_account(ctx.effective),
            "namespace": ctx.fleet.control_namespace,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DesiredState, FleetLoggingContext, FluentbitSpec, PlatformCapabilities, RawAgentConfig,
        Security,
    };
    use crate::resources::test_support::{desired, Fixture};

    fn fixture(security: Security, psp_capable: bool) -> Fixture {
        let fleet = FleetLoggingContext::new("fleet", "logging").with_capabilities(
            PlatformCapabilities {
                pod_security_policy: psp_capable,
                service_monitor: false,
            },
        );
        Fixture::new(
            fleet,
            RawAgentConfig::fluentbit(FluentbitSpec {
                security,
                ..FluentbitSpec::default()
            }),
        )
    }

    #[test]
    fn test_service_account_generated_by_default() {
        let fx = fixture(Security::default(), false);
        let d = desired(ServiceAccountFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Present);
        assert_eq!(d.name(), Some("fleet-agent-fluentbit"));
        assert_eq!(d.object["metadata"]["labels"]["app.kubernetes.io/instance"], "agent");
    }

    #[test]
    fn test_declared_service_account_is_not_managed() {
        let fx = fixture(
            Security {
                service_account: Some("mine".into()),
                ..Security::default()
            },
            false,
        );
        let d = desired(ServiceAccountFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Absent);

        let binding = desired(ClusterRoleBindingFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(binding.object["subjects"][0]["name"], "mine");
    }

    #[test]
    fn test_rbac_disabled_marks_absent() {
        let fx = fixture(
            Security {
                role_based_access_control_create: Some(false),
                ..Security::default()
            },
            false,
        );
        for factory in [
            &ClusterRoleFactory as &dyn ResourceFactory,
            &ClusterRoleBindingFactory,
        ] {
            let d = desired(factory.build(&fx.ctx()).expect("build"));
            assert_eq!(d.state, DesiredState::Absent);
        }
    }

    #[test]
    fn test_psp_not_applicable_without_capability() {
        let fx = fixture(
            Security {
                pod_security_policy_create: Some(true),
                ..Security::default()
            },
            false,
        );
        assert_eq!(
            PodSecurityPolicyFactory.build(&fx.ctx()).expect("build"),
            FactoryOutput::NotApplicable
        );
    }

    #[test]
    fn test_psp_present_when_requested() {
        let fx = fixture(
            Security {
                pod_security_policy_create: Some(true),
                ..Security::default()
            },
            true,
        );
        let psp = desired(PodSecurityPolicyFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(psp.state, DesiredState::Present);
        assert_eq!(psp.name(), Some("fleet-agent-fluentbit-psp"));
        let paths = psp.object["spec"]["allowedHostPaths"]
            .as_array()
            .expect("paths");
        assert_eq!(paths.len(), 3);

        let role = desired(PspClusterRoleFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(
            role.object["rules"][0]["resourceNames"][0],
            "fleet-agent-fluentbit-psp"
        );
    }

    #[test]
    fn test_psp_absent_when_not_requested() {
        let fx = fixture(Security::default(), true);
        let d = desired(PspClusterRoleBindingFactory.build(&fx.ctx()).expect("build"));
        assert_eq!(d.state, DesiredState::Absent);
    }
}
