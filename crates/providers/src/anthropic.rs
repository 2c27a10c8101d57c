//! Native Anthropic `/v1/messages` adapter (SPEC_FULL §4.3).
//!
//! Grounded in the teacher's `providers::anthropic`: system prompt lives
//! in a top-level `system` field rather than the messages array, tool
//! results are `tool_result` content blocks on a `user` message rather
//! than a dedicated `tool` role, and streaming is a sequence of
//! `content_block_start` / `content_block_delta` / `content_block_stop`
//! events keyed by block index rather than OpenAI's flat delta shape.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use agentcore_domain::capability::{LlmCapabilities, ToolSupport};
use agentcore_domain::config::RetryConfig;
use agentcore_domain::message::{Message, Role, ToolCall, ToolMessageStatus, Usage};
use agentcore_domain::stream::StreamEvent;
use agentcore_domain::tool::ToolDefinition;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::cache::annotate_ephemeral_cache;
use crate::error::{ProviderError, Result};
use crate::retry::with_retry;
use crate::sse::sse_response_stream;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider, ModelInfo};
use crate::util::{from_reqwest, resolve_api_key};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Static OAuth client identity plus a long-lived refresh token, used to
/// exchange for a fresh access token when a request comes back 401
/// (§4.3: "Anthropic OAuth"). Interactive login/token-store management is
/// out of scope for this core; a host that already holds a refresh token
/// (from its own login flow) hands it in here.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub refresh_token: String,
    pub token_url: String,
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub default_model: Option<String>,
    pub supports_prompt_caching: bool,
    pub retry: RetryConfig,
    pub capabilities: LlmCapabilities,
    pub oauth: Option<OAuthCredentials>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            id: "anthropic".into(),
            base_url: "https://api.anthropic.com/v1".into(),
            api_key: None,
            api_key_env: "ANTHROPIC_API_KEY".into(),
            default_model: None,
            supports_prompt_caching: true,
            retry: RetryConfig::default(),
            capabilities: LlmCapabilities {
                supports_tools: ToolSupport::StrictJson,
                supports_streaming: true,
                supports_json_mode: false,
                supports_vision: true,
                context_window_tokens: None,
                max_output_tokens: None,
            },
            oauth: None,
        }
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    api_key: RwLock<String>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(config: AnthropicConfig) -> Result<Self> {
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.api_key_env)?;
        Ok(Self {
            config,
            api_key: RwLock::new(api_key),
            client: reqwest::Client::new(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn resolve_model<'a>(&'a self, req_model: Option<&'a str>) -> Result<&'a str> {
        req_model
            .or(self.config.default_model.as_deref())
            .ok_or_else(|| ProviderError::Config {
                provider: self.config.id.clone(),
                message: "no model specified and no default_model configured".into(),
            })
    }

    fn build_body(&self, req: &ChatRequest, model: &str, stream: bool) -> Value {
        let mut system: Vec<Value> = Vec::new();
        let mut messages: Vec<Value> = Vec::new();

        for m in &req.messages {
            match m.role {
                Role::System => system.push(json!({
                    "type": "text",
                    "text": m.content.as_text(),
                })),
                _ => messages.push(to_wire_message(m)),
            }
        }

        let mut system_wrappers: Vec<Value> = system
            .into_iter()
            .map(|part| json!({"content": [part]}))
            .collect();

        if self.config.supports_prompt_caching {
            annotate_ephemeral_cache(&mut system_wrappers, &mut messages);
        }

        let system_parts: Vec<Value> = system_wrappers
            .into_iter()
            .flat_map(|w| w["content"].as_array().cloned().unwrap_or_default())
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": req.temperature,
            "top_p": req.top_p,
            "stream": stream,
        });

        if !system_parts.is_empty() {
            body["system"] = json!(system_parts);
        }
        if !req.tools.is_empty() {
            body["tools"] = json!(req.tools.iter().map(tool_to_wire).collect::<Vec<_>>());
        }

        body
    }

    async fn send_once(
        &self,
        body: &Value,
    ) -> std::result::Result<reqwest::Response, (ProviderError, Option<std::time::Duration>)> {
        let api_key = self.api_key.read().clone();
        let resp = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
    match m.role {
        Role::Assistant => {
            let mut content: Vec<Value> = Vec::new();
            if !m.content.is_empty() {
                content.push(json!({"type": "text", "text": m.content.as_text()}));
            }
            if let Some(tool_calls) = &m.tool_calls {
                for tc in tool_calls {
                    let input: Value = serde_json::from_str(&tc.arguments_json).unwrap_or(json!({}));
                    content.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": input,
                    }));
                }
            }
            json!({"role": "assistant", "content": content})
        }
        Role::Tool => {
            let is_error = m.status == Some(ToolMessageStatus::Error);
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content.as_text(),
                    "is_error": is_error,
                }],
            })
        }
        Role::User => json!({
            "role": "user",
            "content": [{"type": "text", "text": m.content.as_text()}],
        }),
        Role::System => unreachable!("system messages are routed to the top-level system field"),
    }
}

fn tool_to_wire(t: &ToolDefinition) -> Value {
    json!({
        "name": t.name,
        "description": t.description,
        "input_schema": t.json_schema_for_arguments,
    })
}

fn usage_from_wire(v: &Value) -> Option<Usage> {
    let u = v.get("usage")?;
    let input = u.get("input_tokens").and_then(Value::as_u64)?;
    let output = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
    let cached = u.get("cache_read_input_tokens").and_then(Value::as_u64);
    Some(Usage::normalize(input, output, None, cached))
}

fn parse_completion_response(v: Value) -> Result<ChatResponse> {
    let usage = usage_from_wire(&v);
    let blocks = v
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Decode("missing content".into()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let arguments_json = block.get("input").cloned().unwrap_or(json!({})).to_string();
                tool_calls.push(ToolCall { id, name, arguments_json });
            }
            _ => {}
        }
    }

    Ok(ChatResponse {
        content: text,
        tool_calls,
        finish_reason: v.get("stop_reason").and_then(Value::as_str).map(str::to_string),
        usage,
        model: v.get("model").and_then(Value::as_str).map(str::to_string),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming decode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StreamState {
    /// Keyed by block index, since Anthropic streams one event per block
    /// rather than one flat delta like OpenAI.
    blocks: std::collections::HashMap<u64, BlockAcc>,
    usage: Option<Usage>,
    stop_reason: Option<String>,
}

enum BlockAcc {
    ToolUse { id: String, name: String, args: String },
    Other,
}

fn parse_sse_data(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(ProviderError::Decode(e.to_string()))],
    };

    let mut events = Vec::new();

    match v.get("type").and_then(Value::as_str) {
        Some("message_start") => {
            if let Some(u) = v.get("message").and_then(usage_from_wire) {
                state.usage = Some(u);
            }
        }
        Some("content_block_start") => {
            let Some(index) = v.get("index").and_then(Value::as_u64) else {
                return events;
            };
            let block = v.get("content_block").cloned().unwrap_or(Value::Null);
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                let id = block.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                events.push(Ok(StreamEvent::ToolCallStarted {
                    call_id: id.clone(),
                    tool_name: name.clone(),
                }));
                state.blocks.insert(index, BlockAcc::ToolUse { id, name, args: String::new() });
            } else {
                state.blocks.insert(index, BlockAcc::Other);
            }
        }
        Some("content_block_delta") => {
            let Some(index) = v.get("index").and_then(Value::as_u64) else {
                return events;
            };
            let Some(delta) = v.get("delta") else {
                return events;
            };
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    if let Some(text) = delta.get("text").and_then(Value::as_str) {
                        events.push(Ok(StreamEvent::Token { text: text.to_string() }));
                    }
                }
                Some("thinking_delta") => {
                    if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                        events.push(Ok(StreamEvent::Thinking { text: text.to_string() }));
                    }
                }
                Some("input_json_delta") => {
                    if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                        if let Some(BlockAcc::ToolUse { id, args, .. }) = state.blocks.get_mut(&index) {
                            args.push_str(partial);
                            events.push(Ok(StreamEvent::ToolCallDelta {
                                call_id: id.clone(),
                                delta: partial.to_string(),
                            }));
                        }
                    }
                }
                _ => {}
            }
        }
        Some("content_block_stop") => {
            let Some(index) = v.get("index").and_then(Value::as_u64) else {
                return events;
            };
            if let Some(BlockAcc::ToolUse { id, name, args }) = state.blocks.remove(&index) {
                events.push(Ok(StreamEvent::ToolCallFinished {
                    call_id: id,
                    tool_name: name,
                    arguments_json: if args.is_empty() { "{}".into() } else { args },
                }));
            }
        }
        Some("message_delta") => {
            if let Some(u) = v.get("usage").and_then(|u| {
                let output = u.get("output_tokens").and_then(Value::as_u64)?;
                let mut usage = state.usage.take().unwrap_or_default();
                usage.completion_tokens = output;
                usage.total_tokens = usage.prompt_tokens + output;
                Some(usage)
            }) {
                state.usage = Some(u);
            }
            if let Some(reason) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(Value::as_str)
            {
                state.stop_reason = Some(reason.to_string());
            }
        }
        Some("message_stop") => {
            events.push(Ok(StreamEvent::Done {
                usage: state.usage.take(),
                finish_reason: state.stop_reason.take(),
            }));
        }
        Some("error") => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("anthropic stream error")
                .to_string();
            events.push(Err(ProviderError::Other(message)));
        }
        _ => {}
    }

    events
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    fn capabilities(&self) -> LlmCapabilities {
        self.config.capabilities.clone()
    }

    async fn generate_completion(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = self.resolve_model(req.model.as_deref())?.to_string();
        let body = self.build_body(req, &model, false);

        let response = with_retry(
            &self.config.retry,
            || false,
            || self.try_refresh_credentials(),
            |_attempt| {
                let body = body.clone();
                async move {
                    match self.send_once(&body).await {
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
        let body = self.build_body(req, &model, true);

        let response = with_retry(
            &self.config.retry,
            || false,
            || self.try_refresh_credentials(),
            |_attempt| {
                let body = body.clone();
                async move { self.send_once(&body).await }
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

    fn supports_credential_refresh(&self) -> bool {
        self.config.oauth.is_some()
    }

    async fn refresh_credentials(&self) -> Result<()> {
        let oauth = self
            .config
            .oauth
            .as_ref()
            .ok_or_else(|| ProviderError::Auth("no oauth credentials configured".into()))?;

        let resp = self
            .client
            .post(&oauth.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", oauth.refresh_token.as_str()),
                ("client_id", oauth.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(from_reqwest)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, message });
        }

        let body: Value = resp.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Auth("refresh response missing access_token".into()))?;

        *self.api_key.write() = access_token.to_string();
        Ok(())
    }
}

impl AnthropicProvider {
    /// `on_unauthenticated` hook passed to [`with_retry`]: collapses a
    /// failed refresh into `false` since the retry loop treats "could not
    /// refresh" the same as "refresh unsupported" — either way the 401
    /// falls through to normal (non-retryable) classification.
    async fn try_refresh_credentials(&self) -> bool {
        if !self.supports_credential_refresh() {
            return false;
        }
        match self.refresh_credentials().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "anthropic credential refresh failed");
                false
            }
        }
    }
}
