//! Shared data model for the agent orchestrator core.
//!
//! Every other crate in the workspace depends on this one and none of its
//! types depend back out, so the message, error, streaming and
//! configuration shapes defined here are the vocabulary the orchestrator,
//! providers, tools and MCP client all agree on.

pub mod capability;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod tool;

pub use error::{DomainError, ErrorCategory, Result};
pub use message::{
    ContentPart, Message, MessageContent, Role, ToolCall, ToolMessageStatus, TurnStatus, Usage,
};
pub use stream::StreamEvent;
pub use tool::{
    ToolDefinition, ToolErrorReason, ToolExecutionResult, ToolInvocation, ToolResultKind,
    ToolResultStatus,
};
