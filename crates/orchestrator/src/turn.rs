//! The reason→act→observe turn loop (SPEC_FULL §4.1).
//!
//! Grounded in the teacher's `gateway::runtime::turn::run_turn_inner`: a
//! stream-consumption loop that accumulates tool-call deltas keyed by
//! `call_id` into a `(name, arguments)` buffer, and a tool-dispatch stage
//! that runs every call in a batch concurrently before looping back for
//! another LLM call. The teacher models the loop as a spawned task
//! emitting `TurnEvent`s over a channel; this core collapses that to a
//! single `async fn send` that emits through the port-shaped [`EventSink`]
//! instead, since nothing here needs the extra indirection of a channel
//! the caller must also drain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentcore_context::{ContextBuilder, CurrentTurnHint};
use agentcore_domain::config::AgentConfig;
use agentcore_domain::message::{Message, ToolCall, ToolMessageStatus, Usage};
use agentcore_domain::tool::{ToolErrorReason, ToolExecutionResult, ToolInvocation, ToolResultStatus};
use agentcore_domain::StreamEvent;
use agentcore_memory::MemoryPort;
use agentcore_providers::{ChatRequest, ProviderRegistry};
use agentcore_tools::approval::ApprovalDecision;
use agentcore_tools::{ApprovalStore, CompositeToolRegistry};
use futures_util::StreamExt;

use crate::cancel::{CancelGroup, CancelToken};
use crate::error::{OrchestratorError, Result};
use crate::events::{Event, EventPayload, EventSink};
use crate::metrics::{MetricEvent, MetricsSink};
use crate::resolve::resolve_provider;

/// Everything a turn needs that outlives any single conversation, shared
/// across every `Orchestrator` value a host constructs (top-level ones and
/// the narrower ones delegation spawns per sub-agent, per SPEC_FULL §4.7's
/// "fresh Orchestrator instance").
pub struct Orchestrator {
    pub providers: Arc<ProviderRegistry>,
    pub tools: Arc<CompositeToolRegistry>,
    pub memory: Arc<dyn MemoryPort>,
    pub context_builder: Arc<ContextBuilder>,
    pub events: Arc<dyn EventSink>,
    pub metrics: Arc<dyn MetricsSink>,
    pub approvals: Option<Arc<ApprovalStore>>,
    pub cancel_group: Arc<CancelGroup>,
    pub config: AgentConfig,
    pub depth: u32,
}

impl Orchestrator {
    /// Run one full turn: append `user_input`, loop LLM calls and tool
    /// dispatch rounds until a terminal assistant message is produced, and
    /// return it. `conversation_id` keys both the memory port and the
    /// cancellation group.
    pub async fn send(&self, conversation_id: &str, user_input: &str) -> Result<Message> {
        let turn_started = Instant::now();
        let token = self.cancel_group.register(conversation_id);

        let outcome = self.run_turn(conversation_id, user_input, &token).await;

        self.cancel_group.remove(conversation_id);

        let (llm_calls, tool_calls) = match &outcome {
            Ok(stats) => (stats.llm_calls, stats.tool_calls),
            Err(_) => (0, 0),
        };
        self.metrics.record(MetricEvent::TurnCompleted {
            conversation_id: conversation_id.to_string(),
            duration_ms: turn_started.elapsed().as_millis() as u64,
            llm_calls,
            tool_calls,
        });

        outcome.map(|stats| stats.message)
    }

    async fn run_turn(&self, conversation_id: &str, user_input: &str, token: &CancelToken) -> Result<TurnOutcome> {
        self.events.emit(&Event::new(conversation_id, EventPayload::MessageStarted));

        let user_message = Message::user(user_input);
        if let Err(e) = self.memory.append(conversation_id, std::slice::from_ref(&user_message)).await {
            tracing::warn!(error = %e, "memory append failed, continuing in-memory for this turn");
        }

        let mut history = self.memory.get(conversation_id).await.unwrap_or_else(|_| vec![user_message.clone()]);
        let is_first_turn = history.len() <= 1;

        let mut llm_calls = 0u32;
        let mut tool_calls_dispatched = 0u32;

        for _ in 0..self.config.max_llm_calls_per_turn {
            if token.is_cancelled() {
                return self.abort(conversation_id).await;
            }

            llm_calls += 1;
            let (provider, model) = resolve_provider(&self.providers, &self.config).ok_or(OrchestratorError::NoProvider)?;

            let (prefix, _report) = self.context_builder.build(&self.config, CurrentTurnHint { is_first_turn });
            let mut messages = prefix;
            messages.extend(history.iter().cloned());

            let request = ChatRequest {
                model,
                messages,
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_tokens: self.config.max_tokens,
                tools: self.tools.definitions(Some(&self.tool_policy())),
                include_usage: true,
                json_mode: false,
            };

            let llm_started = Instant::now();
            let mut stream = provider.stream_completion(&request).await.map_err(OrchestratorError::from)?;

            let mut text = String::new();
            let mut call_order: Vec<String> = Vec::new();
            let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();
            let mut usage: Option<Usage> = None;

            while let Some(event) = stream.next().await {
                if token.is_cancelled() {
                    return self.abort(conversation_id).await;
                }

                match event.map_err(OrchestratorError::from)? {
                    StreamEvent::Thinking { .. } => {}
                    StreamEvent::Token { text: delta } => {
                        text.push_str(&delta);
                        self.events.emit(&Event::new(conversation_id, EventPayload::AssistantChunk { text: delta }));
                    }
                    StreamEvent::ToolCallStarted { call_id, tool_name } => {
                        if !tc_bufs.contains_key(&call_id) {
                            call_order.push(call_id.clone());
                        }
                        tc_bufs.insert(call_id, (tool_name, String::new()));
                    }
                    StreamEvent::ToolCallDelta { call_id, delta } => {
                        if !tc_bufs.contains_key(&call_id) {
                            call_order.push(call_id.clone());
                        }
                        tc_bufs.entry(call_id).or_insert_with(|| (String::new(), String::new())).1.push_str(&delta);
                    }
                    StreamEvent::ToolCallFinished { call_id, tool_name, arguments_json } => {
                        if !tc_bufs.contains_key(&call_id) {
                            call_order.push(call_id.clone());
                        }
                        tc_bufs.insert(call_id, (tool_name, arguments_json));
                    }
                    StreamEvent::Done { usage: u, .. } => {
                        usage = u;
                        break;
                    }
                    StreamEvent::Error { message } => return Err(OrchestratorError::Other(message)),
                }
            }

            self.metrics.record(MetricEvent::LlmCallCompleted {
                duration_ms: llm_started.elapsed().as_millis() as u64,
                usage: usage.unwrap_or_default(),
            });

            let tool_calls: Vec<ToolCall> = call_order
                .iter()
                .filter_map(|id| tc_bufs.get(id).map(|(name, args)| ToolCall { id: id.clone(), name: name.clone(), arguments_json: args.clone() }))
                .collect();

            let mut assistant_message = Message::assistant(text, tool_calls.clone());
            if let Some(u) = usage {
                assistant_message = assistant_message.with_usage(u);
            }

            if let Err(e) = self.memory.append(conversation_id, std::slice::from_ref(&assistant_message)).await {
                tracing::warn!(error = %e, "memory append failed, continuing in-memory for this turn");
            }
            history.push(assistant_message.clone());
            self.events.emit(&Event::new(conversation_id, EventPayload::AssistantMessage { message: assistant_message.clone() }));

            if tool_calls.is_empty() {
                self.events.emit(&Event::new(conversation_id, EventPayload::Done { usage: usage.unwrap_or_default() }));
                return Ok(TurnOutcome { message: assistant_message, llm_calls, tool_calls: tool_calls_dispatched });
            }

            self.events.emit(&Event::new(conversation_id, EventPayload::ToolCalls { calls: tool_calls.clone() }));

            if token.is_cancelled() {
                return self.abort(conversation_id).await;
            }

            let results = self.dispatch_tool_calls(conversation_id, &tool_calls).await;
            tool_calls_dispatched += results.len() as u32;

            let mut tool_messages = Vec::with_capacity(results.len());
            for result in &results {
                self.events.emit(&Event::new(conversation_id, EventPayload::ToolResult { result: result.clone() }));
                self.metrics.record(MetricEvent::ToolCallCompleted {
                    tool_name: result.name.clone(),
                    duration_ms: result.duration_ms,
                    status: result.status,
                });
                let status = match result.status {
                    ToolResultStatus::Success => ToolMessageStatus::Success,
                    ToolResultStatus::Error => ToolMessageStatus::Error,
                };
                tool_messages.push(Message::tool_result(result.id.clone(), result.name.clone(), result.body.clone(), status));
            }

            if let Err(e) = self.memory.append(conversation_id, &tool_messages).await {
                tracing::warn!(error = %e, "memory append failed, continuing in-memory for this turn");
            }
            history.extend(tool_messages);
        }

        Err(OrchestratorError::TooManyIterations)
    }

    async fn abort(&self, conversation_id: &str) -> Result<TurnOutcome> {
        let aborted = Message::assistant(String::new(), Vec::new()).mark_aborted();
        if let Err(e) = self.memory.append(conversation_id, std::slice::from_ref(&aborted)).await {
            tracing::warn!(error = %e, "memory append failed while recording an aborted turn");
        }
        self.events.emit(&Event::new(
            conversation_id,
            EventPayload::Error { category: agentcore_domain::ErrorCategory::Aborted, message: "turn aborted".into() },
        ));
        Err(OrchestratorError::Aborted)
    }

    fn tool_policy(&self) -> agentcore_domain::config::ToolPolicy {
        agentcore_domain::config::ToolPolicy { allow: self.config.enabled_tools.clone(), deny: Vec::new() }
    }

    /// Run the approval gate (when configured) then dispatch every
    /// approved call concurrently, returning results merged back into the
    /// original invocation order (P2).
    async fn dispatch_tool_calls(&self, conversation_id: &str, calls: &[ToolCall]) -> Vec<ToolExecutionResult> {
        let invocations: Vec<ToolInvocation> = calls
            .iter()
            .map(|c| ToolInvocation { id: c.id.clone(), name: c.name.clone(), arguments_json: c.arguments_json.clone() })
            .collect();

        let approvals = match (self.config.require_tool_approval, &self.approvals) {
            (true, Some(approvals)) => approvals,
            _ => {
                return agentcore_tools::dispatch_batch(
                    &self.tools,
                    invocations,
                    self.config.max_tool_concurrency,
                    Duration::from_millis(self.config.tool_timeout_ms),
                )
                .await;
            }
        };

        let (approval_id, rx) = approvals.insert(conversation_id, invocations.clone()).await;
        let decision = match tokio::time::timeout(approvals.timeout(), rx).await {
            Ok(Ok(decision)) => decision,
            _ => ApprovalDecision::DenyAll,
        };
        // The receiver either already consumed the entry (decision arrived
        // in time) or it's still pending past its timeout; either way this
        // is a harmless no-op once resolved.
        let _ = approvals.approve(approval_id, ApprovalDecision::DenyAll).await;

        let (to_dispatch, mut results) = apply_decision(invocations, decision);
        let dispatched = agentcore_tools::dispatch_batch(
            &self.tools,
            to_dispatch,
            self.config.max_tool_concurrency,
            Duration::from_millis(self.config.tool_timeout_ms),
        )
        .await;
        results.extend(dispatched);

        let mut by_id: HashMap<String, ToolExecutionResult> = results.into_iter().map(|r| (r.id.clone(), r)).collect();
        calls.iter().filter_map(|c| by_id.remove(&c.id)).collect()
    }
}

struct TurnOutcome {
    message: Message,
    llm_calls: u32,
    tool_calls: u32,
}

/// Split an approval-gated batch into invocations to actually dispatch and
/// results to synthesize directly as denied, applying any argument edits
/// from [`ApprovalDecision::Edit`] before the split.
fn apply_decision(invocations: Vec<ToolInvocation>, decision: ApprovalDecision) -> (Vec<ToolInvocation>, Vec<ToolExecutionResult>) {
    match decision {
        ApprovalDecision::ApproveAll => (invocations, Vec::new()),
        ApprovalDecision::DenyAll => {
            let denied = invocations
                .into_iter()
                .map(|inv| ToolExecutionResult::error(inv.id, inv.name, ToolErrorReason::Denied, "tool call denied", 0))
                .collect();
            (Vec::new(), denied)
        }
        ApprovalDecision::ApproveSubset(ids) => {
            let mut approved = Vec::new();
            let mut denied = Vec::new();
            for inv in invocations {
                if ids.contains(&inv.id) {
                    approved.push(inv);
                } else {
                    denied.push(ToolExecutionResult::error(inv.id, inv.name, ToolErrorReason::Denied, "tool call denied", 0));
                }
            }
            (approved, denied)
        }
        ApprovalDecision::Edit(mut edits) => {
            let approved = invocations
                .into_iter()
                .map(|mut inv| {
                    if let Some(args) = edits.remove(&inv.id) {
                        inv.arguments_json = args.to_string();
                    }
                    inv
                })
                .collect();
            (approved, Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TracingMetricsSink;
    use crate::testutil::{DelayTool, EchoTool, RecordingEventSink, StubLlmProvider};
    use agentcore_memory::InMemoryMemoryPort;
    use agentcore_providers::registry::RoleConfig;
    use std::collections::HashMap as Map;

    fn orchestrator(script: Vec<Vec<StreamEvent>>, tools: CompositeToolRegistry) -> (Orchestrator, Arc<RecordingEventSink>) {
        let events = Arc::new(RecordingEventSink::default());
        let stub: Arc<dyn agentcore_providers::LlmProvider> = Arc::new(StubLlmProvider::new("stub", script));
        let mut providers_map = Map::new();
        providers_map.insert("stub".to_string(), stub);
        let providers = ProviderRegistry::from_providers(providers_map, Map::<String, RoleConfig>::new());

        let orchestrator = Orchestrator {
            providers: Arc::new(providers),
            tools: Arc::new(tools),
            memory: Arc::new(InMemoryMemoryPort::new()),
            context_builder: Arc::new(ContextBuilder::new("you are a test agent")),
            events: events.clone(),
            metrics: Arc::new(TracingMetricsSink),
            approvals: None,
            cancel_group: Arc::new(CancelGroup::new()),
            config: AgentConfig { id: "t".into(), ..AgentConfig::default() },
            depth: 0,
        };
        (orchestrator, events)
    }

    fn empty_registry() -> CompositeToolRegistry {
        CompositeToolRegistry::new(Arc::new(agentcore_mcp_client::McpManager::empty()))
    }

    #[tokio::test]
    async fn echo_turn_returns_terminal_message_with_no_tool_calls() {
        let script = vec![vec![
            StreamEvent::Token { text: "hello".into() },
            StreamEvent::Done { usage: Some(Usage::normalize(5, 1, None, None)), finish_reason: Some("stop".into()) },
        ]];
        let (orchestrator, events) = orchestrator(script, empty_registry());

        let reply = orchestrator.send("c1", "hi").await.unwrap();
        assert_eq!(reply.text(), "hello");
        assert!(reply.tool_calls.is_none());
        assert!(events.events().iter().any(|e| matches!(e.payload, EventPayload::Done { .. })));
    }

    #[tokio::test]
    async fn one_tool_round_trip_calls_llm_twice() {
        let script = vec![
            vec![
                StreamEvent::ToolCallStarted { call_id: "call1".into(), tool_name: "echo".into() },
                StreamEvent::ToolCallFinished { call_id: "call1".into(), tool_name: "echo".into(), arguments_json: "{\"s\":\"hi\"}".into() },
                StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) },
            ],
            vec![StreamEvent::Token { text: "done".into() }, StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }],
        ];
        let mut tools = empty_registry();
        tools.register_local(Arc::new(EchoTool));
        let (orchestrator, _events) = orchestrator(script, tools);

        let reply = orchestrator.send("c1", "say hi").await.unwrap();
        assert_eq!(reply.text(), "done");
    }

    #[tokio::test]
    async fn parallel_tool_calls_preserve_invocation_order_in_results() {
        let script = vec![
            vec![
                StreamEvent::ToolCallStarted { call_id: "a".into(), tool_name: "slow_a".into() },
                StreamEvent::ToolCallFinished { call_id: "a".into(), tool_name: "slow_a".into(), arguments_json: "{}".into() },
                StreamEvent::ToolCallStarted { call_id: "b".into(), tool_name: "slow_b".into() },
                StreamEvent::ToolCallFinished { call_id: "b".into(), tool_name: "slow_b".into(), arguments_json: "{}".into() },
                StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) },
            ],
            vec![StreamEvent::Token { text: "ok".into() }, StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }],
        ];
        let mut tools = empty_registry();
        tools.register_local(Arc::new(DelayTool { name: "slow_a".into(), delay_ms: 40 }));
        tools.register_local(Arc::new(DelayTool { name: "slow_b".into(), delay_ms: 5 }));
        let (orchestrator, events) = orchestrator(script, tools);

        orchestrator.send("c1", "go").await.unwrap();

        let bodies: Vec<String> = events
            .events()
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::ToolResult { result } => Some(result.body),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec!["slow_a", "slow_b"]);
    }

    #[tokio::test]
    async fn denied_tool_is_synthesized_without_dispatch_and_turn_still_terminates() {
        let script = vec![
            vec![
                StreamEvent::ToolCallStarted { call_id: "call1".into(), tool_name: "echo".into() },
                StreamEvent::ToolCallFinished { call_id: "call1".into(), tool_name: "echo".into(), arguments_json: "{\"s\":\"hi\"}".into() },
                StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) },
            ],
            vec![StreamEvent::Token { text: "ok, skipped".into() }, StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }],
        ];
        let mut tools = empty_registry();
        tools.register_local(Arc::new(EchoTool));
        let (mut orchestrator, events) = orchestrator(script, tools);
        orchestrator.config.require_tool_approval = true;
        orchestrator.approvals = Some(Arc::new(ApprovalStore::new(Duration::from_millis(50))));

        let reply = orchestrator.send("c1", "say hi").await.unwrap();
        assert_eq!(reply.text(), "ok, skipped");

        let denied = events.events().into_iter().find_map(|e| match e.payload {
            EventPayload::ToolResult { result } if result.status == ToolResultStatus::Error => Some(result),
            _ => None,
        });
        assert_eq!(denied.unwrap().error_reason, Some(ToolErrorReason::Denied));
    }

    #[tokio::test]
    async fn too_many_iterations_without_terminal_message_errors() {
        let tool_call_round = vec![
            StreamEvent::ToolCallStarted { call_id: "c".into(), tool_name: "echo".into() },
            StreamEvent::ToolCallFinished { call_id: "c".into(), tool_name: "echo".into(), arguments_json: "{\"s\":\"x\"}".into() },
            StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) },
        ];
        let script: Vec<Vec<StreamEvent>> = std::iter::repeat(tool_call_round).take(30).collect();
        let mut tools = empty_registry();
        tools.register_local(Arc::new(EchoTool));
        let (orchestrator, _events) = orchestrator(script, tools);

        let err = orchestrator.send("c1", "loop forever").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TooManyIterations));
    }

    #[tokio::test]
    async fn cancellation_mid_stream_aborts_the_turn() {
        let script = vec![vec![
            StreamEvent::Token { text: "a".into() },
            StreamEvent::Token { text: "b".into() },
            StreamEvent::Token { text: "c".into() },
            StreamEvent::Token { text: "d".into() },
            StreamEvent::Done { usage: None, finish_reason: None },
        ]];
        let events = Arc::new(RecordingEventSink::default());
        let stub: Arc<dyn agentcore_providers::LlmProvider> =
            Arc::new(StubLlmProvider::new("stub", script).with_delay_per_event(Duration::from_millis(20)));
        let mut providers_map = Map::new();
        providers_map.insert("stub".to_string(), stub);
        let providers = ProviderRegistry::from_providers(providers_map, Map::<String, RoleConfig>::new());

        let orchestrator = Arc::new(Orchestrator {
            providers: Arc::new(providers),
            tools: Arc::new(empty_registry()),
            memory: Arc::new(InMemoryMemoryPort::new()),
            context_builder: Arc::new(ContextBuilder::new("you are a test agent")),
            events,
            metrics: Arc::new(TracingMetricsSink),
            approvals: None,
            cancel_group: Arc::new(CancelGroup::new()),
            config: AgentConfig { id: "t".into(), ..AgentConfig::default() },
            depth: 0,
        });

        let handle = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.send("c1", "hi").await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(orchestrator.cancel_group.cancel("c1"));

        let result = tokio::time::timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(OrchestratorError::Aborted)));
    }

    #[test]
    fn apply_decision_deny_all_synthesizes_denied_results_for_every_call() {
        let invocations = vec![ToolInvocation { id: "1".into(), name: "x".into(), arguments_json: "{}".into() }];
        let (dispatch, denied) = apply_decision(invocations, ApprovalDecision::DenyAll);
        assert!(dispatch.is_empty());
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].error_reason, Some(ToolErrorReason::Denied));
    }

    #[test]
    fn apply_decision_approve_subset_splits_by_id() {
        let invocations = vec![
            ToolInvocation { id: "1".into(), name: "x".into(), arguments_json: "{}".into() },
            ToolInvocation { id: "2".into(), name: "y".into(), arguments_json: "{}".into() },
        ];
        let (dispatch, denied) = apply_decision(invocations, ApprovalDecision::ApproveSubset(vec!["1".into()]));
        assert_eq!(dispatch.len(), 1);
        assert_eq!(dispatch[0].id, "1");
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].id, "2");
    }
}
