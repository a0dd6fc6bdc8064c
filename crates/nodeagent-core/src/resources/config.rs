//! The config secret carrying the rendered agent configuration.

use serde_json::json;

use super::{FactoryContext, FactoryOutput, ResourceFactory};
use crate::domain::{NodeAgentError, NodeAgentResult, ResourceKind};

/// Secret carrying the rendered agent configuration files.
pub struct ConfigSecretFactory;

impl ResourceFactory for ConfigSecretFactory {
    fn name(&self) -> &'static str {
        "config_secret"
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }

    fn build(&self, ctx: &FactoryContext<'_>) -> NodeAgentResult<FactoryOutput> {
        if ctx.config.files.is_empty() {
            return Err(NodeAgentError::factory(
                self.name(),
                "no rendered configuration",
            ));
        }
        Ok(ctx.present(
            self.kind(),
            &ctx.instance_name(),
            json!({
                "type": "Opaque",
                "stringData": ctx.config.files,
            }),
        ))
    }
}
