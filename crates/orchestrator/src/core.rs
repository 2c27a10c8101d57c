//! `AgentCore`: the crate's top-level, host-owned entry point (SPEC_FULL
//! glossary, §2).
//!
//! Wires together the provider registry, tool registry, memory port,
//! context builder, and event/metrics sinks once, then hands out a fresh,
//! cheaply-constructed [`Orchestrator`] per conversation or per delegated
//! sub-agent call. Grounded in the teacher's `AgentManager` (`gateway::
//! runtime::agent`) as the single place that owns every agent's shared
//! dependencies, generalized from a map of long-lived `AgentRuntime`s to a
//! single shared-port bundle plus an `AgentConfig` supplied per call.

use std::sync::Arc;
use std::time::Duration;

use agentcore_context::ContextBuilder;
use agentcore_domain::config::AgentConfig;
use agentcore_memory::MemoryPort;
use agentcore_providers::ProviderRegistry;
use agentcore_tools::{ApprovalStore, CompositeToolRegistry};

use crate::cancel::CancelGroup;
use crate::delegation::{AgentTemplate, AssignTaskTool, DelegationService};
use crate::events::{EventSink, TracingEventSink};
use crate::metrics::{MetricsSink, TracingMetricsSink};
use crate::turn::Orchestrator;

/// Builds an [`AgentCore`] from its ports, defaulting the event/metrics
/// sinks to the `tracing`-backed ones and leaving delegation templates and
/// the approval store unset.
pub struct AgentCoreBuilder {
    providers: Arc<ProviderRegistry>,
    tools: Arc<CompositeToolRegistry>,
    memory: Arc<dyn MemoryPort>,
    context_builder: Arc<ContextBuilder>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    approvals: Option<Arc<ApprovalStore>>,
    templates: Vec<AgentTemplate>,
}

impl AgentCoreBuilder {
    pub fn new(
        providers: ProviderRegistry,
        tools: CompositeToolRegistry,
        memory: Arc<dyn MemoryPort>,
        context_builder: ContextBuilder,
    ) -> Self {
        Self {
            providers: Arc::new(providers),
            tools: Arc::new(tools),
            memory,
            context_builder: Arc::new(context_builder),
            events: Arc::new(TracingEventSink),
            metrics: Arc::new(TracingMetricsSink),
            approvals: None,
            templates: Vec::new(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn with_tool_approval(mut self, timeout: Duration) -> Self {
        self.approvals = Some(Arc::new(ApprovalStore::new(timeout)));
        self
    }

    pub fn with_delegation_template(mut self, template: AgentTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn build(self) -> AgentCore {
        let cancel_group = Arc::new(CancelGroup::new());
        let delegation = Arc::new(DelegationService::new(
            self.templates,
            self.providers.clone(),
            self.tools.clone(),
            self.memory.clone(),
            self.context_builder.clone(),
            self.events.clone(),
            self.metrics.clone(),
            cancel_group.clone(),
            // Per-call depth is enforced against each agent's own
            // `AgentConfig.max_delegation_depth`; this is only the
            // absolute ceiling a runaway template chain can't exceed.
            64,
        ));

        AgentCore {
            providers: self.providers,
            tools: self.tools,
            memory: self.memory,
            context_builder: self.context_builder,
            events: self.events,
            metrics: self.metrics,
            approvals: self.approvals,
            cancel_group,
            delegation,
        }
    }
}

/// The single value a host constructs once at startup and reuses for
/// every conversation.
pub struct AgentCore {
    providers: Arc<ProviderRegistry>,
    tools: Arc<CompositeToolRegistry>,
    memory: Arc<dyn MemoryPort>,
    context_builder: Arc<ContextBuilder>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsSink>,
    approvals: Option<Arc<ApprovalStore>>,
    cancel_group: Arc<CancelGroup>,
    delegation: Arc<DelegationService>,
}

impl AgentCore {
    /// Build an [`Orchestrator`] for a top-level conversation (depth 0)
    /// running under `config`. If `config.enabled_tools` permits
    /// `assign_task` and at least one delegation template is registered,
    /// the returned tool registry view includes the delegation tool bound
    /// to this conversation.
    pub fn orchestrator_for(&self, conversation_id: &str, config: AgentConfig) -> Orchestrator {
        let tools = self.tools_with_delegation(conversation_id, 0);
        Orchestrator {
            providers: self.providers.clone(),
            tools,
            memory: self.memory.clone(),
            context_builder: self.context_builder.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            approvals: self.approvals.clone(),
            cancel_group: self.cancel_group.clone(),
            config,
            depth: 0,
        }
    }

    pub fn cancel(&self, conversation_id: &str) -> bool {
        self.cancel_group.cancel(conversation_id)
    }

    /// A tool registry carrying every configured local/MCP tool plus
    /// `assign_task`, the latter bound to `conversation_id`/`depth` so a
    /// delegated call enforces depth relative to its own caller.
    fn tools_with_delegation(&self, conversation_id: &str, depth: u32) -> Arc<CompositeToolRegistry> {
        let mut registry = (*self.tools).clone();
        registry.register_local(Arc::new(AssignTaskTool::new(self.delegation.clone(), conversation_id, depth)));
        Arc::new(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubLlmProvider;
    use agentcore_domain::StreamEvent;
    use agentcore_memory::InMemoryMemoryPort;
    use agentcore_providers::registry::RoleConfig;
    use std::collections::HashMap as Map;

    fn core() -> AgentCore {
        let stub: Arc<dyn agentcore_providers::LlmProvider> = Arc::new(StubLlmProvider::new(
            "stub",
            vec![vec![StreamEvent::Token { text: "hi".into() }, StreamEvent::Done { usage: None, finish_reason: None }]],
        ));
        let mut providers_map = Map::new();
        providers_map.insert("stub".to_string(), stub);
        let providers = ProviderRegistry::from_providers(providers_map, Map::<String, RoleConfig>::new());
        let tools = CompositeToolRegistry::new(Arc::new(agentcore_mcp_client::McpManager::empty()));

        AgentCoreBuilder::new(providers, tools, Arc::new(InMemoryMemoryPort::new()), ContextBuilder::new("you are an agent")).build()
    }

    #[tokio::test]
    async fn orchestrator_for_runs_a_full_turn() {
        let core = core();
        let orchestrator = core.orchestrator_for("c1", AgentConfig { id: "a".into(), ..AgentConfig::default() });
        let reply = orchestrator.send("c1", "hello").await.unwrap();
        assert_eq!(reply.text(), "hi");
    }

    #[tokio::test]
    async fn cancel_on_an_unstarted_conversation_is_a_harmless_no_op() {
        let core = core();
        assert!(!core.cancel("never-started"));
    }
}
