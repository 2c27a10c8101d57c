//! The conversation data model (messages, roles, tool calls, usage).
//!
//! Adapted from the teacher's `tool.rs`, which folds tool-call and
//! tool-result information into a generic `ContentPart` enum. This spec
//! wants `toolCalls` explicit on assistant messages and `toolCallId`/
//! `status`/`errorReason` explicit on tool messages, so those fields are
//! promoted onto `Message` directly instead of being content-part variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single unit of message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// An opaque attachment, only meaningful on input to a provider.
    Image { url: String, media_type: String },
}

/// `content` is either a plain string or an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text<S: Into<String>>(s: S) -> Self {
        MessageContent::Text(s.into())
    }

    /// Flatten to a single string, concatenating text parts in order.
    /// Non-text parts contribute nothing.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

/// A structured tool-call request emitted by the LLM on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// The LLM emits arguments as a JSON-encoded string; callers parse lazily.
    pub arguments_json: String,
}

/// Outcome recorded on a tool message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMessageStatus {
    Success,
    Error,
}

/// Token accounting for a single LLM call, or accumulated per conversation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_prompt_tokens: Option<u64>,
}

impl Usage {
    /// Build a usage snapshot, computing `total_tokens` when the caller
    /// didn't supply one and folding `cached` into `prompt_tokens` per the
    /// provider-reported-separately normalization rule (SPEC_FULL §4.3).
    pub fn normalize(
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: Option<u64>,
        cached_prompt_tokens: Option<u64>,
    ) -> Self {
        let prompt_tokens = prompt_tokens + cached_prompt_tokens.unwrap_or(0);
        let total_tokens = total_tokens.unwrap_or(prompt_tokens + completion_tokens);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cached_prompt_tokens,
        }
    }

    /// Fold another usage snapshot into this one (additive monoid, §3).
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cached_prompt_tokens = match (self.cached_prompt_tokens, other.cached_prompt_tokens) {
            (Some(a), Some(b)) => Some(a + b),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
    }
}

/// Status recorded on an assistant message when a turn was cancelled
/// mid-stream. Not part of `role` (SPEC_FULL §4.1 cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Aborted,
}

/// A turn-visible, immutable-once-appended conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    /// Only populated on assistant messages that request tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Only populated on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolMessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Set when an assistant message was persisted mid-stream due to
    /// cancellation (SPEC_FULL §4.1). Never set on other roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_status: Option<TurnStatus>,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
            status: None,
            timestamp: Some(Utc::now()),
            usage: None,
            turn_status: None,
        }
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(Role::System, MessageContent::text(text))
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, MessageContent::text(text))
    }

    /// An assistant message. `tool_calls` may be empty/omitted for a
    /// terminal response, or populated when the LLM requests tool
    /// execution. Per SPEC_FULL §9 open question (i), an assistant message
    /// that only carries tool calls is persisted with empty string content
    /// rather than omitting `content` entirely.
    pub fn assistant<S: Into<String>>(text: S, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, MessageContent::text(text));
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg
    }

    pub fn tool_result<S: Into<String>>(
        tool_call_id: S,
        name: S,
        content: S,
        status: ToolMessageStatus,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, MessageContent::text(content));
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg.status = Some(status);
        msg
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn mark_aborted(mut self) -> Self {
        self.turn_status = Some(TurnStatus::Aborted);
        self
    }

    pub fn text(&self) -> String {
        self.content.as_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_with_tool_calls_keeps_empty_content_visible() {
        let tc = ToolCall {
            id: "t1".into(),
            name: "echo".into(),
            arguments_json: "{}".into(),
        };
        let msg = Message::assistant("", vec![tc.clone()]);
        assert_eq!(msg.text(), "");
        assert_eq!(msg.tool_calls.as_ref().unwrap(), &vec![tc]);
    }

    #[test]
    fn assistant_without_tool_calls_has_none() {
        let msg = Message::assistant("done", vec![]);
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn usage_normalize_folds_cached_into_prompt() {
        let u = Usage::normalize(100, 20, None, Some(30));
        assert_eq!(u.prompt_tokens, 130);
        assert_eq!(u.total_tokens, 150);
        assert_eq!(u.cached_prompt_tokens, Some(30));
    }

    #[test]
    fn usage_normalize_respects_authoritative_total() {
        let u = Usage::normalize(100, 20, Some(999), None);
        assert_eq!(u.total_tokens, 999);
    }

    #[test]
    fn usage_accumulate_sums_fields() {
        let mut a = Usage::normalize(10, 2, None, None);
        let b = Usage::normalize(5, 1, None, Some(2));
        a.accumulate(&b);
        assert_eq!(a.prompt_tokens, 10 + 7);
        assert_eq!(a.completion_tokens, 3);
        assert_eq!(a.cached_prompt_tokens, Some(2));
    }

    #[test]
    fn content_as_text_flattens_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::Image {
                url: "u".into(),
                media_type: "image/png".into(),
            },
            ContentPart::Text { text: "b".into() },
        ]);
        assert_eq!(content.as_text(), "ab");
    }

    #[test]
    fn tool_result_sets_expected_fields() {
        let msg = Message::tool_result("t1", "echo", "x", ToolMessageStatus::Success);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("t1"));
        assert_eq!(msg.status, Some(ToolMessageStatus::Success));
    }
}
