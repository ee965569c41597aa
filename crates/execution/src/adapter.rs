//! Task adapter - turns a module's packaging call into a task unit.

use stagehand_core::{Answers, Module, TaskUnit};
use std::sync::Arc;
use tracing::debug;

/// Invoke the module's provider and wrap its sub-steps.
///
/// The provider is always awaited, even when it hands back no sub-steps.
/// A module without a provider yields an error.
pub async fn adapt(module: &Module, answers: Arc<Answers>) -> anyhow::Result<TaskUnit> {
    let Some(provider) = module.provider() else {
        anyhow::bail!("module '{}' has no packaging provider", module.name);
    };

    let outcome = provider.package(answers).await?;
    if let Some(summary) = &outcome.summary {
        debug!("Packaged {}: {}", module.name, summary);
    }

    Ok(TaskUnit::new(module.friendly_name.clone(), outcome.steps))
}
