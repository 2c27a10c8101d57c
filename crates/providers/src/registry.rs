//! Provider registry and role resolution (SPEC_FULL §4.1 supplement).
//!
//! Grounded in the teacher's `providers::registry`: construction never
//! fails a single misconfigured provider loudly — each failure is
//! recorded and the registry carries on, so one bad API key does not take
//! down every other configured provider. Trimmed of the teacher's
//! dashboard-facing `mask_secrets`/init-error reporting surface; a core
//! library logs failures via `tracing` instead of exposing them to a UI.

use std::collections::HashMap;
use std::sync::Arc;

use crate::anthropic::{AnthropicConfig, AnthropicProvider};
use crate::error::{ProviderError, Result};
use crate::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::traits::LlmProvider;

/// One entry in a registry's construction list.
pub enum ProviderSpec {
    OpenAiCompat(OpenAiCompatConfig),
    Anthropic(AnthropicConfig),
}

impl ProviderSpec {
    fn id(&self) -> &str {
        match self {
            ProviderSpec::OpenAiCompat(c) => &c.id,
            ProviderSpec::Anthropic(c) => &c.id,
        }
    }

    fn build(self) -> Result<Arc<dyn LlmProvider>> {
        match self {
            ProviderSpec::OpenAiCompat(c) => {
                Ok(Arc::new(OpenAiCompatProvider::from_config(c)?) as Arc<dyn LlmProvider>)
            }
            ProviderSpec::Anthropic(c) => {
                Ok(Arc::new(AnthropicProvider::from_config(c)?) as Arc<dyn LlmProvider>)
            }
        }
    }
}

/// What to do when every `ProviderSpec` fails to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPolicy {
    /// At least one provider must come up, or construction fails.
    RequireOne,
    /// Starting with zero providers is acceptable.
    AllowNone,
}

/// A role name (planner, executor, summarizer, embedder, ...) mapped to an
/// ordered list of `{provider_id, model}` fallback candidates, consulted
/// by the orchestrator's model-resolution order (§4.1 supplement).
#[derive(Debug, Clone, Default)]
pub struct RoleConfig {
    pub candidates: Vec<(String, String)>,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    roles: HashMap<String, RoleConfig>,
    init_errors: Vec<(String, ProviderError)>,
}

impl ProviderRegistry {
    pub fn from_specs(
        specs: Vec<ProviderSpec>,
        roles: HashMap<String, RoleConfig>,
        policy: StartupPolicy,
    ) -> Result<Self> {
        let mut providers = HashMap::new();
        let mut init_errors = Vec::new();

        for spec in specs {
            let id = spec.id().to_string();
            match spec.build() {
                Ok(provider) => {
                    providers.insert(id, provider);
                }
                Err(e) => {
                    tracing::warn!(provider = %id, error = %e, "provider failed to initialize");
                    init_errors.push((id, e));
                }
            }
        }

        if providers.is_empty() && policy == StartupPolicy::RequireOne {
            return Err(ProviderError::Config {
                provider: "registry".into(),
                message: "no provider could be initialized".into(),
            });
        }

        Ok(Self { providers, roles, init_errors })
    }

    /// Build a registry directly from already-constructed providers,
    /// bypassing [`ProviderSpec`]. Used when a host (or a test) supplies
    /// its own [`LlmProvider`] implementation rather than one of the
    /// adapters this crate builds from config.
    pub fn from_providers(providers: HashMap<String, Arc<dyn LlmProvider>>, roles: HashMap<String, RoleConfig>) -> Self {
        Self { providers, roles, init_errors: Vec::new() }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve `{provider_id, model}` candidates for `role`, in fallback
    /// order, filtered to providers that are actually registered.
    pub fn candidates_for_role(&self, role: &str) -> Vec<(Arc<dyn LlmProvider>, String)> {
        self.roles
            .get(role)
            .map(|rc| {
                rc.candidates
                    .iter()
                    .filter_map(|(pid, model)| self.get(pid).map(|p| (p, model.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn LlmProvider>)> {
        self.providers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn init_errors(&self) -> &[(String, ProviderError)] {
        &self.init_errors
    }
}
