//! Provider/model resolution order (SPEC_FULL §4.1 supplement).
//!
//! Grounded in the teacher's `resolve_provider` (`gateway/runtime/mod.rs`):
//! in priority order, (1) an explicit `"<providerId>/<model>"` override
//! carried on the agent configuration, (2) the registry's role→model
//! fallback chain for the `executor` role, (3) any remaining registered
//! provider. The teacher's network-classifying "smart router" is not
//! carried over — that's a dashboard/UX concern — but the ordered
//! fallback chain itself is kept.

use std::sync::Arc;

use agentcore_domain::config::AgentConfig;
use agentcore_providers::{LlmProvider, ProviderRegistry};

const EXECUTOR_ROLE: &str = "executor";

/// Resolve the provider (and, if known, a bare model name to request from
/// it) that should serve the next LLM call in this turn.
pub fn resolve_provider(
    providers: &ProviderRegistry,
    config: &AgentConfig,
) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
    if let Some(model) = &config.model {
        if let Some((provider_id, bare_model)) = model.split_once('/') {
            if let Some(provider) = providers.get(provider_id) {
                return Some((provider, Some(bare_model.to_string())));
            }
        }
    }

    if let Some((provider, model)) = providers.candidates_for_role(EXECUTOR_ROLE).into_iter().next() {
        return Some((provider, Some(model)));
    }

    providers.iter().next().map(|(_, p)| (p.clone(), config.model.clone()))
}
