//! Union-by-name tool registry: local handlers plus every MCP server's
//! remote tools, addressed by a single flat namespace (SPEC_FULL §4.5).
//!
//! Grounded in the teacher's `gateway::runtime::tools::build_tool_definitions`
//! / `dispatch_tool`: definitions are assembled from every source and
//! filtered through a [`ToolPolicy`], and dispatch is a single name-keyed
//! match that either calls a local handler or forwards to the right MCP
//! server. MCP tool names are prefixed `mcp_<serverId>_<remoteName>` per
//! the naming convention already fixed in `agentcore_domain::tool`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentcore_domain::config::ToolPolicy;
use agentcore_domain::tool::{ToolDefinition, ToolInvocation};
use agentcore_mcp_client::McpManager;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, ToolError};

/// A tool whose implementation lives in this process, as opposed to one
/// routed to a remote MCP server.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// `arguments` is the already-parsed JSON object; handlers never see
    /// the raw `arguments_json` string the LLM emitted.
    async fn invoke(&self, arguments: Value) -> Result<ToolOutcome>;
}

#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub body: String,
    pub kind: agentcore_domain::tool::ToolResultKind,
    pub metadata: Option<Value>,
}

impl ToolOutcome {
    pub fn text(body: impl Into<String>) -> Self {
        Self { body: body.into(), kind: agentcore_domain::tool::ToolResultKind::Text, metadata: None }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self { body: body.into(), kind: agentcore_domain::tool::ToolResultKind::Json, metadata: None }
    }
}

fn mcp_tool_name(server_id: &str, remote_name: &str) -> String {
    format!("mcp_{server_id}_{remote_name}")
}

#[derive(Clone)]
pub struct CompositeToolRegistry {
    locals: HashMap<String, Arc<dyn LocalTool>>,
    mcp: Arc<McpManager>,
}

impl CompositeToolRegistry {
    pub fn new(mcp: Arc<McpManager>) -> Self {
        Self { locals: HashMap::new(), mcp }
    }

    pub fn register_local(&mut self, tool: Arc<dyn LocalTool>) {
        let name = tool.definition().name.clone();
        self.locals.insert(name, tool);
    }

    /// All tool definitions visible across local handlers and every alive
    /// MCP server, filtered through `policy` when one is supplied.
    pub fn definitions(&self, policy: Option<&ToolPolicy>) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.locals.values().map(|t| t.definition()).collect();

        for (server_id, tool) in self.mcp.list_tools() {
            defs.push(ToolDefinition {
                name: mcp_tool_name(server_id, &tool.name),
                description: tool.description.clone(),
                json_schema_for_arguments: tool.input_schema.clone(),
            });
        }

        if let Some(policy) = policy {
            defs.retain(|d| policy.allows(&d.name));
        }
        defs
    }

    /// Dispatch a single invocation to whichever source owns its name.
    /// `timeout` bounds the call; a local handler that hangs or a remote
    /// MCP server that never responds both surface as [`ToolError::Timeout`].
    pub async fn dispatch(&self, invocation: &ToolInvocation, timeout: Duration) -> Result<ToolOutcome> {
        let arguments: Value = serde_json::from_str(&invocation.arguments_json)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let call = self.dispatch_by_name(&invocation.name, arguments);
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout),
        }
    }

    async fn dispatch_by_name(&self, name: &str, arguments: Value) -> Result<ToolOutcome> {
        if let Some(tool) = self.locals.get(name) {
            return tool.invoke(arguments).await;
        }

        if let Some((server_id, remote_name)) = split_mcp_name(name, &self.mcp) {
            let result = self.mcp.call_tool(server_id, remote_name, arguments).await?;
            let body = result
                .content
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            return if result.is_error {
                Err(ToolError::Other(body))
            } else {
                Ok(ToolOutcome::text(body))
            };
        }

        Err(ToolError::ToolNotFound(name.to_string()))
    }
}

/// `mcp_<serverId>_<remoteName>` parses ambiguously when server or tool
/// names contain underscores, so resolve by trying each known server id
/// as a prefix rather than splitting on the first/last underscore.
fn split_mcp_name<'a>(name: &'a str, mcp: &'a McpManager) -> Option<(&'a str, &'a str)> {
    let rest = name.strip_prefix("mcp_")?;
    mcp.list_tools()
        .into_iter()
        .map(|(server_id, _)| server_id)
        .find_map(|server_id| {
            rest.strip_prefix(server_id)
                .and_then(|r| r.strip_prefix('_'))
                .map(|remote_name| (server_id, remote_name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_domain::tool::ToolResultKind;

    struct EchoTool;

    #[async_trait]
    impl LocalTool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "echoes its input".into(),
                json_schema_for_arguments: serde_json::json!({"type": "object"}),
            }
        }

        async fn invoke(&self, arguments: Value) -> Result<ToolOutcome> {
            Ok(ToolOutcome::json(arguments.to_string()))
        }
    }

    fn empty_registry() -> CompositeToolRegistry {
        CompositeToolRegistry::new(Arc::new(McpManager::empty()))
    }

    #[tokio::test]
    async fn dispatches_to_registered_local_tool() {
        let mut registry = empty_registry();
        registry.register_local(Arc::new(EchoTool));

        let invocation = ToolInvocation { id: "1".into(), name: "echo".into(), arguments_json: "{\"a\":1}".into() };
        let outcome = registry.dispatch(&invocation, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome.kind, ToolResultKind::Json);
        assert_eq!(outcome.body, "{\"a\":1}");
    }

    #[tokio::test]
    async fn unknown_tool_name_errors_not_found() {
        let registry = empty_registry();
        let invocation = ToolInvocation { id: "1".into(), name: "missing".into(), arguments_json: "{}".into() };
        let err = registry.dispatch(&invocation, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ToolError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn malformed_arguments_json_errors_invalid_arguments() {
        let mut registry = empty_registry();
        registry.register_local(Arc::new(EchoTool));
        let invocation = ToolInvocation { id: "1".into(), name: "echo".into(), arguments_json: "not json".into() };
        let err = registry.dispatch(&invocation, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn policy_filters_definitions() {
        let mut registry = empty_registry();
        registry.register_local(Arc::new(EchoTool));
        let policy = ToolPolicy { allow: vec![], deny: vec!["echo".into()] };
        assert!(registry.definitions(Some(&policy)).is_empty());
        assert_eq!(registry.definitions(None).len(), 1);
    }
}
