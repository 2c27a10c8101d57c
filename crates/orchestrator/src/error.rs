//! Orchestrator-crate error type, normalized to [`ErrorCategory`] at the
//! boundary (SPEC_FULL §7).

use agentcore_domain::ErrorCategory;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("turn exceeded max_llm_calls_per_turn without reaching a terminal message")]
    TooManyIterations,

    #[error("delegation depth exceeded")]
    DepthExceeded,

    #[error("turn aborted")]
    Aborted,

    #[error("provider error: {0}")]
    Provider(#[from] agentcore_providers::ProviderError),

    #[error("no llm provider available to serve this turn")]
    NoProvider,

    #[error("agent template not found: {0}")]
    TemplateNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::TooManyIterations => ErrorCategory::TooManyIterations,
            OrchestratorError::DepthExceeded => ErrorCategory::DepthExceeded,
            OrchestratorError::Aborted => ErrorCategory::Aborted,
            OrchestratorError::Provider(e) => e.category(),
            OrchestratorError::NoProvider => ErrorCategory::NotFound,
            OrchestratorError::TemplateNotFound(_) => ErrorCategory::NotFound,
            OrchestratorError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
