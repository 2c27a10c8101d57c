//! The closed error taxonomy (SPEC_FULL §7) and a top-level domain error.
//!
//! Every crate in the workspace defines its own `thiserror` enum for
//! internal failure detail, but normalizes to [`ErrorCategory`] at its
//! public boundary. The orchestrator only ever matches on the category,
//! never on a downstream crate's concrete error type.

use serde::{Deserialize, Serialize};

/// The closed set of failure categories every layer normalizes onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    RateLimit,
    Timeout,
    NetworkError,
    Denied,
    Aborted,
    DepthExceeded,
    TooManyIterations,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Unauthenticated => "unauthenticated",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::Denied => "denied",
            ErrorCategory::Aborted => "aborted",
            ErrorCategory::DepthExceeded => "depth_exceeded",
            ErrorCategory::TooManyIterations => "too_many_iterations",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Top-level error for failures that don't belong to a more specific crate
/// (malformed config values, generic I/O at the domain boundary).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DomainError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::InvalidInput(_) => ErrorCategory::InvalidInput,
            DomainError::Io(_) | DomainError::Json(_) | DomainError::Other(_) => {
                ErrorCategory::Unknown
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
