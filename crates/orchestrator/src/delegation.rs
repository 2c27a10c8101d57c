//! Specialist sub-agent delegation (SPEC_FULL §4.7).
//!
//! Grounded in the teacher's `gateway::runtime::agent::{AgentManager,
//! run_agent}`: a named template resolves to a narrower agent, a child
//! cancellation scope is registered under the parent before the child's
//! turn starts, and the child's final message becomes the caller's result.
//! The teacher keeps a long-lived `AgentRuntime` per configured agent; this
//! core instead builds a fresh [`Orchestrator`] per delegation call, per
//! SPEC_FULL §4.7's literal "a fresh Orchestrator instance".

use std::collections::HashMap;
use std::sync::Arc;

use agentcore_domain::config::AgentConfig;
use agentcore_memory::MemoryPort;
use agentcore_providers::ProviderRegistry;
use agentcore_tools::registry::{LocalTool, ToolOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::cancel::CancelGroup;
use crate::error::{OrchestratorError, Result};
use crate::events::EventSink;
use crate::metrics::MetricsSink;
use crate::turn::Orchestrator;

/// A named specialist: the system prompt and tool allow-list a delegated
/// sub-agent runs with. Resolved by name out of a host-supplied template
/// table, never constructed ad hoc by the calling LLM.
#[derive(Debug, Clone)]
pub struct AgentTemplate {
    pub name: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub enabled: bool,
}

/// Arguments the `assign_task` tool call carries, per SPEC_FULL §4.7.
#[derive(Debug, Deserialize)]
struct AssignTaskArgs {
    agent: String,
    task: String,
}

/// Resolves templates and spawns narrower [`Orchestrator`] instances to
/// serve delegated turns, sharing the parent's ports but not its tool
/// scope, memory key, or depth budget.
pub struct DelegationService {
    templates: HashMap<String, AgentTemplate>,
    providers: Arc<ProviderRegistry>,
    tools: Arc<agentcore_tools::CompositeToolRegistry>,
    memory: Arc<dyn MemoryPort>,
    context_builder: Arc<agentcore_context::ContextBuilder>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    cancel_group: Arc<CancelGroup>,
    max_delegation_depth: u32,
}

impl DelegationService {
    pub fn new(
        templates: Vec<AgentTemplate>,
        providers: Arc<ProviderRegistry>,
        tools: Arc<agentcore_tools::CompositeToolRegistry>,
        memory: Arc<dyn MemoryPort>,
        context_builder: Arc<agentcore_context::ContextBuilder>,
        events: Arc<dyn EventSink>,
        metrics: Arc<dyn MetricsSink>,
        cancel_group: Arc<CancelGroup>,
        max_delegation_depth: u32,
    ) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.name.clone(), t)).collect(),
            providers,
            tools,
            memory,
            context_builder,
            events,
            metrics,
            cancel_group,
            max_delegation_depth,
        }
    }

    /// Run a delegated turn to completion and return the sub-agent's
    /// terminal assistant content, to be folded back into the parent's
    /// tool message. `parent_conversation_id` seeds the child's own
    /// conversation id and cancellation-group membership.
    pub async fn delegate(&self, parent_conversation_id: &str, parent_depth: u32, agent: &str, task: &str) -> Result<String> {
        let depth = parent_depth + 1;
        if depth > self.max_delegation_depth {
            return Err(OrchestratorError::DepthExceeded);
        }

        let template = self.templates.get(agent).ok_or_else(|| OrchestratorError::TemplateNotFound(agent.to_string()))?;
        if !template.enabled {
            return Err(OrchestratorError::TemplateNotFound(agent.to_string()));
        }

        let available = self.tools.definitions(None).into_iter().map(|d| d.name).collect::<std::collections::HashSet<_>>();
        let resolved_tools: Vec<String> = template
            .tools
            .iter()
            .filter(|name| {
                let ok = available.contains(*name);
                if !ok {
                    tracing::warn!(tool = %name, agent = %agent, "delegation template references an unregistered tool, eliding it");
                }
                ok
            })
            .cloned()
            .collect();

        let child_config = AgentConfig {
            id: format!("{agent}@{parent_conversation_id}"),
            system_prompt: template.system_prompt.clone(),
            enabled_tools: resolved_tools,
            ..AgentConfig::default()
        };

        let child = Orchestrator {
            providers: self.providers.clone(),
            tools: self.tools.clone(),
            memory: self.memory.clone(),
            context_builder: self.context_builder.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            approvals: None,
            cancel_group: self.cancel_group.clone(),
            config: child_config,
            depth,
        };

        let child_conversation_id = format!("{parent_conversation_id}/delegate/{agent}/{depth}");
        self.cancel_group.add_child(parent_conversation_id, &child_conversation_id);

        let result = child.send(&child_conversation_id, task).await;

        self.cancel_group.remove_child(parent_conversation_id, &child_conversation_id);
        self.cancel_group.remove(&child_conversation_id);

        result.map(|message| message.text())
    }
}

/// The local tool a host registers so the LLM can request delegation via
/// an ordinary `assign_task(agent, task)` tool call (SPEC_FULL §4.7).
pub struct AssignTaskTool {
    service: Arc<DelegationService>,
    conversation_id: String,
    depth: u32,
}

impl AssignTaskTool {
    pub fn new(service: Arc<DelegationService>, conversation_id: impl Into<String>, depth: u32) -> Self {
        Self { service, conversation_id: conversation_id.into(), depth }
    }
}

#[async_trait]
impl LocalTool for AssignTaskTool {
    fn definition(&self) -> agentcore_domain::tool::ToolDefinition {
        agentcore_domain::tool::ToolDefinition {
            name: "assign_task".into(),
            description: "Delegate a task to a named specialist sub-agent and return its final answer.".into(),
            json_schema_for_arguments: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent": {"type": "string"},
                    "task": {"type": "string"}
                },
                "required": ["agent", "task"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> agentcore_tools::Result<ToolOutcome> {
        let args: AssignTaskArgs = serde_json::from_value(arguments).map_err(|e| agentcore_tools::ToolError::InvalidArguments(e.to_string()))?;
        let outcome = self
            .service
            .delegate(&self.conversation_id, self.depth, &args.agent, &args.task)
            .await
            .map_err(|e| match e {
                OrchestratorError::DepthExceeded => agentcore_tools::ToolError::Other("delegation depth exceeded".into()),
                OrchestratorError::TemplateNotFound(name) => agentcore_tools::ToolError::ToolNotFound(format!("agent template '{name}' not found or disabled")),
                other => agentcore_tools::ToolError::Other(other.to_string()),
            })?;
        Ok(ToolOutcome::text(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingEventSink;
    use crate::metrics::TracingMetricsSink;
    use crate::testutil::StubLlmProvider;
    use agentcore_domain::StreamEvent;
    use agentcore_memory::InMemoryMemoryPort;
    use agentcore_providers::registry::RoleConfig;
    use std::collections::HashMap as Map;

    fn service(max_depth: u32, template: AgentTemplate) -> DelegationService {
        let stub: Arc<dyn agentcore_providers::LlmProvider> = Arc::new(StubLlmProvider::new(
            "stub",
            vec![vec![StreamEvent::Token { text: "delegated answer".into() }, StreamEvent::Done { usage: None, finish_reason: None }]],
        ));
        let mut providers_map = Map::new();
        providers_map.insert("stub".to_string(), stub);
        let providers = Arc::new(ProviderRegistry::from_providers(providers_map, Map::<String, RoleConfig>::new()));
        let tools = Arc::new(agentcore_tools::CompositeToolRegistry::new(Arc::new(agentcore_mcp_client::McpManager::empty())));

        DelegationService::new(
            vec![template],
            providers,
            tools,
            Arc::new(InMemoryMemoryPort::new()),
            Arc::new(agentcore_context::ContextBuilder::new("you are a specialist")),
            Arc::new(TracingEventSink),
            Arc::new(TracingMetricsSink),
            Arc::new(CancelGroup::new()),
            max_depth,
        )
    }

    fn enabled_template() -> AgentTemplate {
        AgentTemplate { name: "researcher".into(), system_prompt: "research things".into(), tools: vec![], enabled: true }
    }

    #[tokio::test]
    async fn delegate_runs_child_turn_and_returns_its_terminal_text() {
        let service = service(3, enabled_template());
        let result = service.delegate("parent-1", 0, "researcher", "look into X").await.unwrap();
        assert_eq!(result, "delegated answer");
    }

    #[tokio::test]
    async fn delegate_past_max_depth_is_rejected() {
        let service = service(1, enabled_template());
        let err = service.delegate("parent-1", 1, "researcher", "look into X").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DepthExceeded));
    }

    #[tokio::test]
    async fn delegate_to_unknown_template_is_rejected() {
        let service = service(3, enabled_template());
        let err = service.delegate("parent-1", 0, "ghost", "anything").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn delegate_to_disabled_template_is_rejected() {
        let mut template = enabled_template();
        template.enabled = false;
        let service = service(3, template);
        let err = service.delegate("parent-1", 0, "researcher", "anything").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TemplateNotFound(_)));
    }
}
