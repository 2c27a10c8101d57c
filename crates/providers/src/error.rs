//! Provider-local error type, normalized to [`ErrorCategory`] at the crate
//! boundary (SPEC_FULL §7 supplement).

use agentcore_domain::ErrorCategory;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("provider '{provider}' not configured: {message}")]
    Config { provider: String, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Http { status, .. } => match *status {
                401 => ErrorCategory::Unauthenticated,
                403 => ErrorCategory::PermissionDenied,
                404 => ErrorCategory::NotFound,
                429 => ErrorCategory::RateLimit,
                s if (500..600).contains(&s) => ErrorCategory::NetworkError,
                _ => ErrorCategory::InvalidInput,
            },
            ProviderError::Network(_) => ErrorCategory::NetworkError,
            ProviderError::Timeout => ErrorCategory::Timeout,
            ProviderError::Decode(_) => ErrorCategory::Unknown,
            ProviderError::Config { .. } => ErrorCategory::InvalidInput,
            ProviderError::Auth(_) => ErrorCategory::Unauthenticated,
            ProviderError::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a transport retry is permitted for this error (§4.3): 429
    /// and 5xx HTTP statuses, or any network-level failure. A bare 401 is
    /// not retryable here — `with_retry` handles it separately via a single
    /// credential-refresh attempt before this classifier ever runs.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            ProviderError::Network(_) | ProviderError::Timeout => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
