//! Tool-facing data model: definitions advertised to the LLM, invocations
//! requested by it, and the results the executor produces (§3, §4.5).

use serde::{Deserialize, Serialize};

/// `{name, description, jsonSchemaForArguments}`. Names are unique within
/// the registry; MCP tools are prefixed `mcp_<serverId>_<remoteName>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub json_schema_for_arguments: serde_json::Value,
}

/// A concrete call: `{id, name, argumentsJson}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultKind {
    Text,
    Json,
}

/// The closed set of failure reasons a tool execution result may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorReason {
    Aborted,
    Denied,
    Timeout,
    PermissionDenied,
    NotFound,
    ToolNotFound,
    NetworkError,
    RateLimit,
    InvalidInput,
    Unknown,
}

/// `{id, name, status, kind, body, metadata?, durationMs, errorReason?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub id: String,
    pub name: String,
    pub status: ToolResultStatus,
    pub kind: ToolResultKind,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ToolErrorReason>,
}

impl ToolExecutionResult {
    pub fn ok(id: impl Into<String>, name: impl Into<String>, body: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ToolResultStatus::Success,
            kind: ToolResultKind::Text,
            body: body.into(),
            metadata: None,
            duration_ms,
            error_reason: None,
        }
    }

    pub fn error(
        id: impl Into<String>,
        name: impl Into<String>,
        reason: ToolErrorReason,
        body: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ToolResultStatus::Error,
            kind: ToolResultKind::Text,
            body: body.into(),
            metadata: None,
            duration_ms,
            error_reason: Some(reason),
        }
    }
}
