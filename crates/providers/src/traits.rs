//! The provider-facing public contract (SPEC_FULL §4.3).

use agentcore_domain::capability::LlmCapabilities;
use agentcore_domain::message::{Message, ToolCall, Usage};
use agentcore_domain::tool::ToolDefinition;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `params = {model, messages[], temperature, topP, maxTokens, tools[],
/// includeUsage?}` (§4.3).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
    pub tools: Vec<ToolDefinition>,
    pub include_usage: bool,
    pub json_mode: bool,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            model: None,
            messages: Vec::new(),
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: None,
            tools: Vec::new(),
            include_usage: true,
            json_mode: false,
        }
    }
}

/// `{content, toolCalls?, finishReason, usage}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
}

/// Unified contract over heterogeneous provider HTTP APIs.
///
/// Implementors own their own retry/backoff (§4.3) and SSE decoding
/// internally; callers never see a raw transport error, only [`ProviderError`](crate::ProviderError).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    fn capabilities(&self) -> LlmCapabilities;

    /// `generateCompletion(params) → {content, toolCalls?, finishReason, usage}`.
    async fn generate_completion(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// `streamCompletion(params, handlers) → ...`. This core models the
    /// `handlers` as a stream of [`StreamEvent`](agentcore_domain::StreamEvent)s
    /// the caller consumes directly rather than passing callback closures
    /// (SPEC_FULL §9 "closures and callbacks").
    async fn stream_completion(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<agentcore_domain::StreamEvent>>>;

    /// `listModels() → [ModelInfo]`, where supported. Default: unsupported.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }

    /// Whether this provider can exchange a held refresh token for a new
    /// access token without user interaction (§4.3: "401 during an
    /// authenticated request triggers one credential refresh attempt for
    /// providers that support it"). Default: unsupported.
    fn supports_credential_refresh(&self) -> bool {
        false
    }

    /// Attempt exactly one credential refresh. Only called once per request,
    /// immediately after a 401, and only when `supports_credential_refresh`
    /// returns true.
    async fn refresh_credentials(&self) -> Result<()> {
        Ok(())
    }
}
