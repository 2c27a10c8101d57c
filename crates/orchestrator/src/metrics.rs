//! Usage/latency aggregation port (SPEC_FULL §2, §6 supplement).
//!
//! Grounded in the teacher's `TraceEvent` enum emitted via
//! `tracing::info!` as structured JSON; this expansion narrows the
//! payload to the numeric/durational facts the event stream itself
//! doesn't carry in aggregate form.

use agentcore_domain::message::Usage;
use agentcore_domain::tool::ToolResultStatus;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricEvent {
    LlmCallCompleted { duration_ms: u64, usage: Usage },
    ToolCallCompleted { tool_name: String, duration_ms: u64, status: ToolResultStatus },
    TurnCompleted { conversation_id: String, duration_ms: u64, llm_calls: u32, tool_calls: u32 },
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

/// Logs each event as a structured `tracing::info!` record, matching the
/// teacher's `TraceEvent::emit` convention. Hosts that want real
/// aggregation (histograms, counters exported to Prometheus, ...)
/// implement [`MetricsSink`] themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, event: MetricEvent) {
        let json = serde_json::to_string(&event).unwrap_or_default();
        tracing::info!(agent_metric = %json, "agent_metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingMetricsSink;

    #[test]
    fn recording_sink_captures_events() {
        let sink = RecordingMetricsSink::default();
        sink.record(MetricEvent::LlmCallCompleted { duration_ms: 10, usage: Usage::default() });
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn tracing_sink_does_not_panic() {
        TracingMetricsSink.record(MetricEvent::TurnCompleted {
            conversation_id: "c1".into(),
            duration_ms: 5,
            llm_calls: 1,
            tool_calls: 0,
        });
    }
}
