//! Streaming event types shared by every provider adapter (SPEC_FULL §4.3).

use serde::{Deserialize, Serialize};

use crate::message::Usage;

/// A single decoded event from a provider's streaming response.
///
/// `ToolCallDelta` accumulators are keyed by the provider's numeric index
/// (not `call_id` — ids only arrive on the first chunk for some providers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A reasoning/thinking delta, emitted by providers that expose it
    /// (e.g. Anthropic extended thinking, DeepSeek reasoning_content).
    Thinking { text: String },
    Token { text: String },
    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallDelta { call_id: String, delta: String },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments_json: String,
    },
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    Error { message: String },
}
