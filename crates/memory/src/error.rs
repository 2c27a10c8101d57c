//! Memory-crate error type, normalized to [`ErrorCategory`] at the boundary.

use agentcore_domain::ErrorCategory;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MemoryError::Io(_) | MemoryError::Json(_) | MemoryError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
