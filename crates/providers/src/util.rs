//! Small shared helpers used across provider adapters.

use crate::error::ProviderError;

/// Convert a `reqwest::Error` into the crate's error type, preserving the
/// status code when the failure was an HTTP-level response rather than a
/// connection/DNS failure.
pub(crate) fn from_reqwest(e: reqwest::Error) -> ProviderError {
    if let Some(status) = e.status() {
        ProviderError::Http {
            status: status.as_u16(),
            message: e.to_string(),
        }
    } else if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Resolve an API key: a directly-configured value takes priority, then an
/// environment variable named by the caller. No keychain fallback — secret
/// storage integration is a host-level concern (SPEC_FULL §1 out of scope).
pub(crate) fn resolve_api_key(
    direct: Option<&str>,
    env_var: &str,
) -> std::result::Result<String, ProviderError> {
    if let Some(key) = direct {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    std::env::var(env_var).map_err(|_| ProviderError::Auth(format!(
        "no API key configured and {env_var} is not set"
    )))
}
