//! MCP server lifecycle and tool discovery (SPEC_FULL §4.4).
//!
//! Grounded in the teacher's `mcp-client::manager`: per-server init is
//! independently fallible and non-fatal to the rest of the fleet, tool
//! names are exposed prefixed by server id so the tool registry can route
//! a call back to the right connection.

use std::collections::HashMap;

use agentcore_domain::ErrorCategory;
use serde_json::Value;

use crate::config::{McpConfig, McpServerConfig, McpTransportKind};
use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{HttpTransport, McpTransport, StdioTransport, TransportError};

pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    async fn initialize(config: &McpServerConfig) -> Result<Self, McpError> {
        let transport: Box<dyn McpTransport> = match config.transport {
            McpTransportKind::Stdio => Box::new(StdioTransport::spawn(config).map_err(McpError::Transport)?),
            McpTransportKind::Http => Box::new(HttpTransport::new(config).map_err(McpError::Transport)?),
        };

        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = transport
            .send_request("initialize", Some(params_value))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            return Err(McpError::Protocol(format!("initialize failed: {}", resp.error.unwrap())));
        }

        transport
            .send_notification("notifications/initialized")
            .await
            .map_err(McpError::Transport)?;

        let tools_resp = transport.send_request("tools/list", None).await.map_err(McpError::Transport)?;
        let tools = if tools_resp.is_error() {
            tracing::warn!(server_id = %config.id, "tools/list returned error, server will have no tools");
            Vec::new()
        } else {
            let result_value = tools_resp.result.unwrap_or(Value::Null);
            match serde_json::from_value::<ToolsListResult>(result_value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(server_id = %config.id, error = %e, "failed to parse tools/list result");
                    Vec::new()
                }
            }
        };

        tracing::info!(server_id = %config.id, tool_count = tools.len(), "MCP server initialized");

        Ok(Self { id: config.id.clone(), tools, transport })
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }

        let params = serde_json::json!({"name": tool_name, "arguments": arguments});
        let resp = self
            .transport
            .send_request("tools/call", Some(params))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            return Err(McpError::Protocol(format!("tools/call failed: {}", resp.error.unwrap())));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value::<ToolCallResult>(result_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    async fn shutdown(&self) {
        tracing::info!(server_id = %self.id, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

pub struct McpManager {
    servers: HashMap<String, McpServer>,
}

impl McpManager {
    pub fn empty() -> Self {
        Self { servers: HashMap::new() }
    }

    pub async fn from_config(config: &McpConfig) -> Self {
        let mut servers = HashMap::new();

        for server_config in &config.servers {
            tracing::info!(server_id = %server_config.id, transport = ?server_config.transport, "initializing MCP server");
            match McpServer::initialize(server_config).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(server_id = %server_config.id, error = %e, "failed to initialize MCP server, skipping");
                }
            }
        }

        if !servers.is_empty() {
            tracing::info!(count = servers.len(), "MCP manager ready");
        }

        Self { servers }
    }

    /// `(server_id, tool_def)` for every tool on every alive server.
    pub fn list_tools(&self) -> Vec<(&str, &McpToolDef)> {
        self.servers
            .values()
            .filter(|s| s.is_alive())
            .flat_map(|server| server.tools.iter().map(move |tool| (server.id.as_str(), tool)))
            .collect()
    }

    pub async fn call_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let server = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        server.call_tool(tool_name, arguments).await
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn tool_count(&self) -> usize {
        self.servers.values().filter(|s| s.is_alive()).map(|s| s.tools.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.servers.values().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),
    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl McpError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            McpError::Transport(t) => t.category(),
            McpError::Protocol(_) => ErrorCategory::Unknown,
            McpError::ServerNotFound(_) => ErrorCategory::NotFound,
            McpError::ServerDown(_) => ErrorCategory::NetworkError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_has_no_servers_or_tools() {
        let manager = McpManager::empty();
        assert!(manager.is_empty());
        assert_eq!(manager.tool_count(), 0);
        assert!(manager.list_tools().is_empty());
    }

    #[tokio::test]
    async fn call_tool_on_unknown_server_returns_not_found() {
        let manager = McpManager::empty();
        let err = manager.call_tool("missing", "x", Value::Null).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }
}
