//! Tool-crate error type, normalized to [`ErrorCategory`] at the boundary.

use agentcore_domain::ErrorCategory;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool call denied")]
    Denied,

    #[error("tool call aborted")]
    Aborted,

    #[error("tool call timed out")]
    Timeout,

    #[error("mcp error: {0}")]
    Mcp(#[from] agentcore_mcp_client::McpError),

    #[error("{0}")]
    Other(String),
}

impl ToolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ToolError::ToolNotFound(_) => ErrorCategory::NotFound,
            ToolError::InvalidArguments(_) => ErrorCategory::InvalidInput,
            ToolError::Denied => ErrorCategory::Denied,
            ToolError::Aborted => ErrorCategory::Aborted,
            ToolError::Timeout => ErrorCategory::Timeout,
            ToolError::Mcp(e) => e.category(),
            ToolError::Other(_) => ErrorCategory::Unknown,
        }
    }

    pub fn reason(&self) -> agentcore_domain::tool::ToolErrorReason {
        use agentcore_domain::tool::ToolErrorReason;
        match self {
            ToolError::ToolNotFound(_) => ToolErrorReason::ToolNotFound,
            ToolError::InvalidArguments(_) => ToolErrorReason::InvalidInput,
            ToolError::Denied => ToolErrorReason::Denied,
            ToolError::Aborted => ToolErrorReason::Aborted,
            ToolError::Timeout => ToolErrorReason::Timeout,
            ToolError::Mcp(_) => ToolErrorReason::NetworkError,
            ToolError::Other(_) => ToolErrorReason::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
