//! Resolution of a raw agent configuration into its effective form.
//!
//! Stages, each a pure function over the previous stage's output:
//! 1. variant validation
//! 2. baseline < profile overlay < user override
//! 3. derived fields (AWS filter, metrics, scrape annotations, liveness probe)
//! 4. context rewrites that read live fleet state

use tracing::debug;

use crate::defaults;
use crate::domain::{
    AgentVariant, EffectiveAgentSpec, FleetLoggingContext, FluentbitSpec, Metrics,
    NodeAgentError, NodeAgentResult, RawAgentConfig, SyslogNgSpec, VariantKind,
    PROFILE_WINDOWS,
};
use crate::merge;

/// Resolve `raw` against `fleet`. Never cached: fleet-dependent fields are
/// recomputed on every call.
pub fn resolve(
    raw: &RawAgentConfig,
    fleet: &FleetLoggingContext,
) -> NodeAgentResult<EffectiveAgentSpec> {
    let mut effective = resolve_layers(raw)?;
    derive_fields(&mut effective)?;
    for rewrite in ContextRewrite::ALL {
        if rewrite.applies_to(&effective) {
            rewrite.apply(&mut effective, fleet);
            debug!(rewrite = rewrite.name(), "applied context rewrite");
        }
    }
    Ok(effective)
}

/// Validate the variant and fold baseline, profile overlay and user override.
pub fn resolve_layers(raw: &RawAgentConfig) -> NodeAgentResult<EffectiveAgentSpec> {
    let user = raw.variant()?;
    let kind = user.kind();
    let baseline = defaults::baseline(kind);
    let overlay = defaults::profile_overlay(kind, raw.profile_name());

    let variant = match (baseline, overlay, user) {
        (AgentVariant::Fluentbit(base), overlay, AgentVariant::Fluentbit(user)) => {
            let profile = match overlay {
                Some(AgentVariant::Fluentbit(spec)) => Some(spec),
                _ => None,
            };
            let layers: Vec<&FluentbitSpec> = profile.iter().chain(Some(&user)).collect();
            AgentVariant::Fluentbit(merge::merge_layers(&base, layers)?)
        }
        (AgentVariant::SyslogNg(base), overlay, AgentVariant::SyslogNg(user)) => {
            let profile = match overlay {
                Some(AgentVariant::SyslogNg(spec)) => Some(spec),
                _ => None,
            };
            let layers: Vec<&SyslogNgSpec> = profile.iter().chain(Some(&user)).collect();
            AgentVariant::SyslogNg(merge::merge_layers(&base, layers)?)
        }
        (_, _, user) => {
            return Err(NodeAgentError::ConfigurationConflict(format!(
                "no baseline for variant {}",
                user.kind().short_name()
            )))
        }
    };

    Ok(EffectiveAgentSpec {
        profile: raw.profile.clone().filter(|p| !p.is_empty()),
        metadata: raw.metadata.clone(),
        variant,
    })
}

/// Compute derived fields in order; each step reads the previous one's output.
pub fn derive_fields(effective: &mut EffectiveAgentSpec) -> NodeAgentResult<()> {
    let windows = effective.is_windows();
    if let AgentVariant::Fluentbit(spec) = &mut effective.variant {
        if let Some(user) = &spec.filter_aws {
            spec.filter_aws = Some(merge::merge_at(
                &defaults::aws_filter_defaults(),
                user,
                "filterAws",
            )?);
        }
    }

    derive_metrics(&mut effective.variant, windows)?;
    let Some(metrics) = effective.metrics().cloned() else {
        return Ok(());
    };
    let (Some(path), Some(port)) = (metrics.path.as_deref(), metrics.port) else {
        return Ok(());
    };

    if metrics.prometheus_annotations == Some(true) {
        let annotations = &mut daemon_set_mut(&mut effective.variant)
            .spec
            .template
            .metadata
            .annotations;
        for (key, value) in defaults::prometheus_annotations(path, port) {
            annotations.entry(key).or_insert(value);
        }
    }

    let daemon_set = daemon_set_mut(&mut effective.variant);
    if let Some(container) = daemon_set.spec.template.spec.containers.first_mut() {
        let probe = defaults::liveness_probe(path, port);
        container.liveness_probe = Some(match &container.liveness_probe {
            Some(existing) => merge::merge_at(&probe, existing, "livenessProbe")?,
            None => probe,
        });
    }
    Ok(())
}

fn derive_metrics(variant: &mut AgentVariant, windows: bool) -> NodeAgentResult<()> {
    match variant {
        AgentVariant::Fluentbit(spec) => {
            spec.metrics = match &spec.metrics {
                Some(user) => Some(merge_metrics(VariantKind::Fluentbit, user)?),
                None if spec.liveness_default_check != Some(false) && !windows => {
                    Some(defaults::fluentbit_liveness_metrics())
                }
                None => None,
            };
        }
        AgentVariant::SyslogNg(spec) => {
            if let Some(user) = &spec.metrics {
                spec.metrics = Some(merge_metrics(VariantKind::SyslogNg, user)?);
            }
        }
    }
    Ok(())
}

fn merge_metrics(kind: VariantKind, user: &Metrics) -> NodeAgentResult<Metrics> {
    merge::merge_at(&defaults::metrics_defaults(kind), user, "metrics")
}

fn daemon_set_mut(variant: &mut AgentVariant) -> &mut crate::domain::DaemonSetOverrides {
    match variant {
        AgentVariant::Fluentbit(spec) => &mut spec.daemon_set_overrides,
        AgentVariant::SyslogNg(spec) => &mut spec.daemon_set_overrides,
    }
}

/// Fields whose final value depends on fleet context rather than on the
/// static layers. Applied after every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRewrite {
    /// Windows forwarders reach the API server through a URL that embeds the
    /// cluster domain.
    WindowsKubeUrl,
}

impl ContextRewrite {
    pub const ALL: [ContextRewrite; 1] = [ContextRewrite::WindowsKubeUrl];

    pub fn name(&self) -> &'static str {
        match self {
            ContextRewrite::WindowsKubeUrl => "windows_kube_url",
        }
    }

    pub fn applies_to(&self, effective: &EffectiveAgentSpec) -> bool {
        match self {
            ContextRewrite::WindowsKubeUrl => {
                effective.kind() == VariantKind::Fluentbit
                    && effective.profile.as_deref() == Some(PROFILE_WINDOWS)
            }
        }
    }

    pub fn apply(&self, effective: &mut EffectiveAgentSpec, fleet: &FleetLoggingContext) {
        match self {
            ContextRewrite::WindowsKubeUrl => {
                if let AgentVariant::Fluentbit(spec) = &mut effective.variant {
                    spec.filter_kubernetes.kube_url =
                        Some(defaults::windows_kube_url(&fleet.cluster_domain_suffix()));
                }
            }
        }
    }
}
