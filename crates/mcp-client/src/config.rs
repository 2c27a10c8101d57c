//! MCP server configuration (SPEC_FULL §4.4 supplement).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub id: String,
    pub transport: McpTransportKind,
    /// Required for [`McpTransportKind::Stdio`].
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Required for [`McpTransportKind::Http`].
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn d_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}
