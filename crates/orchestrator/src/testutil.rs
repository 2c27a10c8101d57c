//! In-process stub ports shared by this crate's unit tests (SPEC_FULL §1
//! ambient-stack note: "in-process stub implementations of each port
//! rather than mocking frameworks").

#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agentcore_domain::capability::LlmCapabilities;
use agentcore_domain::message::Usage;
use agentcore_domain::StreamEvent;
use agentcore_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use agentcore_tools::registry::{LocalTool, ToolOutcome};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::stream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::events::{Event, EventSink};
use crate::metrics::{MetricEvent, MetricsSink};

type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Replays a fixed script of `(content, tool_calls, usage)` completions,
/// one per `generate_completion`/`stream_completion` call, in order.
/// Lets a test script a multi-turn tool round trip (SPEC_FULL §8
/// end-to-end scenarios) without a real HTTP endpoint.
pub struct StubLlmProvider {
    id: String,
    script: Mutex<Vec<Vec<StreamEvent>>>,
    calls: AtomicUsize,
    delay_per_event: std::time::Duration,
}

impl StubLlmProvider {
    pub fn new(id: impl Into<String>, script: Vec<Vec<StreamEvent>>) -> Self {
        Self { id: id.into(), script: Mutex::new(script), calls: AtomicUsize::new(0), delay_per_event: std::time::Duration::ZERO }
    }

    /// Insert a real `tokio::time::sleep` between each yielded event, so a
    /// test can race a cancellation against a stream that is still in
    /// flight (SPEC_FULL §8 scenario 5).
    pub fn with_delay_per_event(mut self, delay: std::time::Duration) -> Self {
        self.delay_per_event = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<StreamEvent> {
        let mut script = self.script.lock();
        if script.is_empty() {
            vec![StreamEvent::Token { text: String::new() }, StreamEvent::Done { usage: None, finish_reason: None }]
        } else {
            script.remove(0)
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlmProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::default()
    }

    async fn generate_completion(&self, _req: &ChatRequest) -> ProviderResult<ChatResponse> {
        unimplemented!("orchestrator tests exercise the streaming path")
    }

    async fn stream_completion(&self, _req: &ChatRequest) -> ProviderResult<BoxStream<'static, ProviderResult<StreamEvent>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let events = self.next_script();
        let delay = self.delay_per_event;
        if delay.is_zero() {
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        } else {
            Ok(Box::pin(stream::iter(events).then(move |event| async move {
                tokio::time::sleep(delay).await;
                Ok(event)
            })))
        }
    }
}

pub fn usage(prompt: u64, completion: u64) -> Usage {
    Usage::normalize(prompt, completion, None, None)
}

/// Echoes its single `s` argument back as the tool body.
pub struct EchoTool;

#[async_trait]
impl LocalTool for EchoTool {
    fn definition(&self) -> agentcore_domain::tool::ToolDefinition {
        agentcore_domain::tool::ToolDefinition {
            name: "echo".into(),
            description: "echoes its input".into(),
            json_schema_for_arguments: serde_json::json!({"type": "object"}),
        }
    }

    async fn invoke(&self, arguments: Value) -> agentcore_tools::Result<ToolOutcome> {
        let s = arguments.get("s").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(ToolOutcome::text(s.to_string()))
    }
}

/// Sleeps for the configured duration before returning a fixed body; used
/// to assert that concurrent tool dispatch preserves result order
/// regardless of completion order (SPEC_FULL §8 scenario 3).
pub struct DelayTool {
    pub name: String,
    pub delay_ms: u64,
}

#[async_trait]
impl LocalTool for DelayTool {
    fn definition(&self) -> agentcore_domain::tool::ToolDefinition {
        agentcore_domain::tool::ToolDefinition {
            name: self.name.clone(),
            description: "sleeps then returns its name".into(),
            json_schema_for_arguments: serde_json::json!({"type": "object"}),
        }
    }

    async fn invoke(&self, _arguments: Value) -> agentcore_tools::Result<ToolOutcome> {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        Ok(ToolOutcome::text(self.name.clone()))
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[derive(Default)]
pub struct RecordingMetricsSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetricsSink {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record(&self, event: MetricEvent) {
        self.events.lock().push(event);
    }
}

pub fn mcp_manager() -> Arc<agentcore_mcp_client::McpManager> {
    Arc::new(agentcore_mcp_client::McpManager::empty())
}
