//! Event fan-out to external UIs/loggers (SPEC_FULL §2, §6).
//!
//! Grounded in the teacher's `TraceEvent`: a single tagged, serializable
//! enum emitted fire-and-forget via `tracing`. The teacher's variants are
//! product-specific (`SessionResolved`, `SkillDocLoaded`, ...); this core
//! narrows the payload to exactly the kinds SPEC_FULL's external-interface
//! section names.

use agentcore_domain::message::{Message, ToolCall, Usage};
use agentcore_domain::tool::ToolExecutionResult;
use agentcore_domain::ErrorCategory;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    MessageStarted,
    AssistantChunk { text: String },
    ToolCalls { calls: Vec<ToolCall> },
    ToolResult { result: ToolExecutionResult },
    AssistantMessage { message: Message },
    Done { usage: Usage },
    Error { category: ErrorCategory, message: String },
}

/// `{conversationId, messageId?, payload}` — handlers MUST NOT block the
/// turn loop, so [`EventSink::emit`] is synchronous; an implementation
/// that needs to do slow work (write to a socket, a database) spawns it.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(conversation_id: impl Into<String>, payload: EventPayload) -> Self {
        Self { conversation_id: conversation_id.into(), message_id: None, payload }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Logs every event as a structured `tracing::info!` record, matching the
/// teacher's `TraceEvent::emit` convention.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &Event) {
        let json = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(agent_event = %json, "agent_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingEventSink;

    #[test]
    fn recording_sink_preserves_emission_order() {
        let sink = RecordingEventSink::default();
        sink.emit(&Event::new("c1", EventPayload::MessageStarted));
        sink.emit(&Event::new("c1", EventPayload::AssistantChunk { text: "hi".into() }));
        let recorded = sink.events();
        assert_eq!(recorded.len(), 2);
        assert!(matches!(recorded[0].payload, EventPayload::MessageStarted));
    }

    #[test]
    fn tracing_sink_does_not_panic() {
        TracingEventSink.emit(&Event::new("c1", EventPayload::Done { usage: Usage::default() }));
    }
}
