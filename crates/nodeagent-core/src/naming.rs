//! Deterministic names and labels for one agent instance.

use std::collections::BTreeMap;

use crate::domain::{EffectiveAgentSpec, FleetLoggingContext, VariantKind};

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Name and label derivation shared by every resource factory.
#[derive(Debug, Clone, Copy)]
pub struct InstanceNames<'a> {
    fleet: &'a FleetLoggingContext,
    instance: &'a str,
}

impl<'a> InstanceNames<'a> {
    pub fn new(fleet: &'a FleetLoggingContext, instance: &'a str) -> Self {
        Self { fleet, instance }
    }

    pub fn instance(&self) -> &'a str {
        self.instance
    }

    /// `<fleet>-<instance>-<short>`
    pub fn qualified_name(&self, short_name: &str) -> String {
        format!("{}-{}-{}", self.fleet.name, self.instance, short_name)
    }

    /// `<fleet>-<short>`, for objects shared across instances such as the
    /// aggregator.
    pub fn fleet_qualified_name(&self, short_name: &str) -> String {
        format!("{}-{}", self.fleet.name, short_name)
    }

    /// Labels selecting this instance's pods. A subset of [`Self::labels`].
    pub fn selector_labels(&self, kind: VariantKind) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_NAME.to_string(), kind.short_name().to_string()),
            (LABEL_INSTANCE.to_string(), self.instance.to_string()),
            (LABEL_MANAGED_BY.to_string(), self.fleet.name.clone()),
        ])
    }

    /// Fleet labels, then user labels, then the fixed identity labels; later
    /// entries win on key collisions.
    pub fn labels(&self, effective: &EffectiveAgentSpec) -> BTreeMap<String, String> {
        let mut labels = self.fleet.labels.clone();
        labels.extend(
            effective
                .metadata
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        labels.extend(self.selector_labels(effective.kind()));
        labels
    }

    /// The user-declared account if set, else the instance-qualified default.
    pub fn service_account(&self, effective: &EffectiveAgentSpec) -> String {
        match effective.declared_service_account() {
            Some(name) => name.to_string(),
            None => self.qualified_name(effective.kind().short_name()),
        }
    }
}
