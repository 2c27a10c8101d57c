//! OpenAI-compatible adapter: covers OpenAI itself, Azure OpenAI, and any
//! self-hosted OpenAI-wire-compatible endpoint (OpenRouter, DeepInfra,
//! Z.ai, Moonshot, vLLM, …).
//!
//! Grounded in the teacher's `providers::openai_compat`, trimmed of the
//! Copilot `X-Initiator` header and Ollama/LM-Studio special cases the
//! spec does not name, but keeping the Azure URL-shape difference since
//! SPEC_FULL §4.3 explicitly folds Azure into this family.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use agentcore_domain::config::RetryConfig;
use agentcore_domain::capability::{LlmCapabilities, ToolSupport};
use agentcore_domain::message::{Message, Role, ToolCall, Usage};
use agentcore_domain::stream::StreamEvent;
use agentcore_domain::tool::ToolDefinition;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use serde_json::{json, Value};

use crate::cache::annotate_ephemeral_cache;
use crate::error::{ProviderError, Result};
use crate::retry::with_retry;
use crate::sse::sse_response_stream;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider, ModelInfo};
use crate::util::{from_reqwest, resolve_api_key};

/// Azure-specific URL shaping: Azure addresses deployments by name and
/// pins an `api-version` query parameter instead of using a model field.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub deployment: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub default_model: Option<String>,
    pub azure: Option<AzureConfig>,
    pub supports_prompt_caching: bool,
    pub retry: RetryConfig,
    pub capabilities: LlmCapabilities,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            id: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".into(),
            default_model: None,
            azure: None,
            supports_prompt_caching: false,
            retry: RetryConfig::default(),
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::Basic,
                supports_streaming: true,
                supports_json_mode: true,
                supports_vision: true,
                context_window_tokens: None,
                max_output_tokens: None,
            },
        }
    }
}

pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(config: OpenAiCompatConfig) -> Result<Self> {
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env)?;
        Ok(Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        })
    }

    fn chat_url(&self, model: &str) -> String {
        match &self.config.azure {
            Some(az) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.config.base_url.trim_end_matches('/'),
                az.deployment,
                az.api_version
            ),
            None => format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')),
        }
    }

    fn authed_request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        if self.config.azure.is_some() {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    fn resolve_model<'a>(&'a self, req_model: Option<&'a str>) -> Result<&'a str> {
        req_model
            .or(self.config.default_model.as_deref())
            .ok_or_else(|| ProviderError::Config {
                provider: self.config.id.clone(),
                message: "no model specified and no default_model configured".into(),
            })
    }

    fn build_chat_body(&self, req: &ChatRequest, model: &str, stream: bool) -> Value {
        let mut system: Vec<Value> = Vec::new();
        let mut rest: Vec<Value> = Vec::new();
        for m in &req.messages {
            let wire = to_wire_message(m);
            if m.role == Role::System {
                system.push(wire);
            } else {
                rest.push(wire);
            }
        }

        if self.config.supports_prompt_caching {
            annotate_ephemeral_cache(&mut system, &mut rest);
        }

        let mut messages = system;
        messages.extend(rest);

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": req.temperature,
            "top_p": req.top_p,
            "stream": stream,
        });

        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !req.tools.is_empty() {
            body["tools"] = json!(req.tools.iter().map(tool_to_wire).collect::<Vec<_>>());
        }
        if req.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if stream && req.include_usage {
            body["stream_options"] = json!({"include_usage": true});
        }

        body
    }

    async fn send_once(
        &self,
        body: &Value,
        url: &str,
    ) -> std::result::Result<reqwest::Response, (ProviderError, Option<std::time::Duration>)> {
        let resp = self
            .authed_request(url)
            .json(body)
            .send()
            .await
            .map_err(|e| (from_reqwest(e), None))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(crate::retry::retry_after_from_header);
            let message = resp.text().await.unwrap_or_default();
            return Err((ProviderError::Http { status, message }, retry_after));
        }
        Ok(resp)
    }
}

fn to_wire_message(m: &Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut v = json!({"role": role, "content": m.content.as_text()});
    if let (Role::Assistant, Some(tool_calls)) = (m.role, &m.tool_calls) {
        v["tool_calls"] = json!(tool_calls
            .iter()
            .map(|tc| json!({
                "id": tc.id,
                "type": "function",
                "function": {"name": tc.name, "arguments": tc.arguments_json},
            }))
            .collect::<Vec<_>>());
        if m.content.is_empty() {
            v["content"] = Value::Null;
        }
    }
    if m.role == Role::Tool {
        if let Some(id) = &m.tool_call_id {
            v["tool_call_id"] = json!(id);
        }
        if let Some(name) = &m.name {
            v["name"] = json!(name);
        }
    }
    v
}

fn tool_to_wire(t: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": t.name,
            "description": t.description,
            "parameters": t.json_schema_for_arguments,
        }
    })
}

fn usage_from_wire(v: &Value) -> Option<Usage> {
    let u = v.get("usage")?;
    let prompt = u.get("prompt_tokens")?.as_u64()?;
    let completion = u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
    let total = u.get("total_tokens").and_then(Value::as_u64);
    let cached = u
        .get("prompt_tokens_details")
        .and_then(|d| d.get("cached_tokens"))
        .and_then(Value::as_u64);
    Some(Usage::normalize(prompt, completion, total, cached))
}

fn parse_completion_response(v: Value) -> Result<ChatResponse> {
    let usage = usage_from_wire(&v);
    let choice = v
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ProviderError::Decode("missing choices[0]".into()))?;
    let message = choice.get("message").ok_or_else(|| ProviderError::Decode("missing message".into()))?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();
    let finish_reason = choice.get("finish_reason").and_then(Value::as_str).map(str::to_string);
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc.get("id")?.as_str()?.to_string();
                    let f = tc.get("function")?;
                    let name = f.get("name")?.as_str()?.to_string();
                    let arguments_json = f.get("arguments")?.as_str()?.to_string();
                    Some(ToolCall { id, name, arguments_json })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
        model: v.get("model").and_then(Value::as_str).map(str::to_string),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming decode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StreamState {
    /// Keyed by the numeric `index` the provider assigns (not `call_id`;
    /// ids arrive on the first chunk only — SPEC_FULL §4.3).
    tool_acc: HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
}

fn parse_sse_data(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    if data == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: state.usage.take(),
            finish_reason: None,
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(ProviderError::Decode(e.to_string()))],
    };

    if let Some(u) = usage_from_wire(&v) {
        state.usage = Some(u);
    }

    let Some(choice) = v.get("choices").and_then(|c| c.get(0)) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token { text: text.to_string() }));
        }
    }
    if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Thinking { text: text.to_string() }));
        }
    }

    if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for tc in tool_calls {
            let Some(index) = tc.get("index").and_then(Value::as_u64) else {
                continue;
            };
            let entry = state.tool_acc.entry(index).or_insert_with(|| (String::new(), String::new(), String::new()));
            let mut started = false;
            if let Some(id) = tc.get("id").and_then(Value::as_str) {
                if entry.0.is_empty() {
                    entry.0 = id.to_string();
                }
            }
            if let Some(name) = tc.get("function").and_then(|f| f.get("name")).and_then(Value::as_str) {
                if entry.1.is_empty() {
                    entry.1 = name.to_string();
                    started = true;
                }
            }
            if started && !entry.0.is_empty() {
                events.push(Ok(StreamEvent::ToolCallStarted {
                    call_id: entry.0.clone(),
                    tool_name: entry.1.clone(),
                }));
            }
            if let Some(args) = tc.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                entry.2.push_str(args);
                events.push(Ok(StreamEvent::ToolCallDelta {
                    call_id: entry.0.clone(),
                    delta: args.to_string(),
                }));
            }
        }
    }

    if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
        if finish_reason == "tool_calls" || !state.tool_acc.is_empty() {
            for (_, (id, name, args)) in state.tool_acc.drain() {
                events.push(Ok(StreamEvent::ToolCallFinished {
                    call_id: id,
                    tool_name: name,
                    arguments_json: if args.is_empty() { "{}".into() } else { args },
                }));
            }
        }
        events.push(Ok(StreamEvent::Done {
            usage: state.usage.take(),
            finish_reason: Some(finish_reason.to_string()),
        }));
    }

    events
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    fn capabilities(&self) -> LlmCapabilities {
        self.config.capabilities.clone()
    }

    async fn generate_completion(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = self.resolve_model(req.model.as_deref())?.to_string();
        let url = self.chat_url(&model);
        let body = self.build_chat_body(req, &model, false);

        let response = with_retry(
            &self.config.retry,
            || false,
            || async { false },
            |_attempt| {
                let url = url.clone();
                let body = body.clone();
                async move {
                    match self.send_once(&body, &url).await {
                        Ok(resp) => resp.json::<Value>().await.map_err(|e| (from_reqwest(e), None)),
                        Err(e) => Err(e),
                    }
                }
            },
        )
        .await?;

        parse_completion_response(response)
    }

    async fn stream_completion(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = self.resolve_model(req.model.as_deref())?.to_string();
        let url = self.chat_url(&model);
        let body = self.build_chat_body(req, &model, true);

        let response = with_retry(
            &self.config.retry,
            || false,
            || async { false },
            |_attempt| {
                let url = url.clone();
                let body = body.clone();
                async move { self.send_once(&body, &url).await }
            },
        )
        .await?;

        let yielded = Arc::new(AtomicBool::new(false));
        let mut state = StreamState::default();
        let stream = sse_response_stream(
            response,
            move |data| parse_sse_data(data, &mut state),
            yielded,
        );
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_domain::message::ToolMessageStatus;

    #[test]
    fn to_wire_message_assistant_with_tool_calls_has_null_content() {
        let tc = ToolCall { id: "t1".into(), name: "echo".into(), arguments_json: "{}".into() };
        let msg = Message::assistant("", vec![tc]);
        let wire = to_wire_message(&msg);
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "echo");
    }

    #[test]
    fn to_wire_message_tool_carries_id_and_name() {
        let msg = Message::tool_result("t1", "echo", "x", ToolMessageStatus::Success);
        let wire = to_wire_message(&msg);
        assert_eq!(wire["tool_call_id"], "t1");
        assert_eq!(wire["name"], "echo");
        assert_eq!(wire["content"], "x");
    }

    #[test]
    fn usage_from_wire_folds_cached() {
        let v = json!({"usage": {"prompt_tokens": 100, "completion_tokens": 10, "prompt_tokens_details": {"cached_tokens": 20}}});
        let u = usage_from_wire(&v).unwrap();
        assert_eq!(u.prompt_tokens, 120);
        assert_eq!(u.total_tokens, 130);
    }

    #[test]
    fn parse_sse_done_sentinel_flushes_usage() {
        let mut state = StreamState::default();
        state.usage = Some(Usage::normalize(1, 2, None, None));
        let events = parse_sse_data("[DONE]", &mut state);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn parse_sse_text_delta_emits_token() {
        let mut state = StreamState::default();
        let data = json!({"choices": [{"delta": {"content": "hi"}}]}).to_string();
        let events = parse_sse_data(&data, &mut state);
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "hi"));
    }

    #[test]
    fn parse_sse_tool_call_delta_accumulates_by_index() {
        let mut state = StreamState::default();
        let chunk1 = json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "t1", "function": {"name": "echo", "arguments": "{\"a\":"}}]}}]}).to_string();
        let chunk2 = json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "1}"}}]}, "finish_reason": "tool_calls"}]}).to_string();

        let events1 = parse_sse_data(&chunk1, &mut state);
        assert!(events1.iter().any(|e| matches!(e, Ok(StreamEvent::ToolCallStarted { .. }))));

        let events2 = parse_sse_data(&chunk2, &mut state);
        let finished = events2.iter().find_map(|e| match e {
            Ok(StreamEvent::ToolCallFinished { arguments_json, .. }) => Some(arguments_json.clone()),
            _ => None,
        });
        assert_eq!(finished, Some("{\"a\":1}".to_string()));
    }
}
