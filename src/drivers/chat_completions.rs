//! OpenAI 兼容 Chat Completions 驱动：DeepSeek、Groq、Ollama 等
//!
//! Chat Completions driver for OpenAI-compatible servers. Works for DeepSeek,
//! Groq, Moonshot, Ollama, vLLM and anything else that speaks
//! `POST /chat/completions` with `stream: true`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{count, DriverCore, ProviderDriver};
use crate::normalize::RawFault;
use crate::types::{Message, ProtocolEvent, ProviderEnv, ProviderId, SessionRequest, Usage};
use crate::{ChunkStream, FaultResult, Result};

#[derive(Debug, Clone)]
pub struct ChatCompletionsDriver {
    core: DriverCore,
}

impl ChatCompletionsDriver {
    pub fn new(env: ProviderEnv) -> Result<Self> {
        Ok(Self {
            core: DriverCore::new(ProviderId::OpenAiCompatible, env)?,
        })
    }

    pub fn build_body(request: &SessionRequest, model: &str) -> Value {
        let mut messages: Vec<Message> = Vec::new();
        if let Some(sys) = request.system.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            messages.push(Message::system(sys));
        }
        messages.extend(request.prompt.to_messages());

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = request.max_output_tokens {
            body["max_tokens"] = json!(max);
        }
        body
    }
}

/// Map one Chat Completions chunk.
pub fn map_event(frame: Value) -> FaultResult<Vec<ProtocolEvent>> {
    if frame.get("error").map_or(false, |e| !e.is_null()) {
        return Err(RawFault::Json(frame));
    }

    let mut events = Vec::new();
    if let Some(delta) = frame.pointer("/choices/0/delta") {
        if delta.get("role").and_then(|r| r.as_str()) == Some("assistant") {
            events.push(ProtocolEvent::running());
        }
        if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                events.push(ProtocolEvent::Text(content.to_string()));
            }
        }
        if let Some(calls) = delta.get("tool_calls").and_then(|c| c.as_array()) {
            for name in calls
                .iter()
                .filter_map(|c| c.pointer("/function/name").and_then(|n| n.as_str()))
            {
                events.push(ProtocolEvent::running_with(format!("tool: {}", name)));
            }
        }
    }
    if let Some(u) = frame.get("usage").filter(|u| !u.is_null()) {
        events.push(ProtocolEvent::Usage(Usage::from_counts(
            count(u, "prompt_tokens"),
            count(u, "completion_tokens"),
            count(u, "total_tokens"),
        )));
    }
    Ok(events)
}

#[async_trait]
impl ProviderDriver for ChatCompletionsDriver {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OpenAiCompatible
    }

    fn default_model(&self) -> Option<&str> {
        self.core.default_model()
    }

    async fn stream(&self, request: SessionRequest) -> Result<ChunkStream> {
        let model = self.core.prepare(&request)?;
        let url = self.core.endpoint("chat/completions")?;
        let body = Self::build_body(&request, &model);
        let http = self
            .core
            .stream_request(url, body, &request)
            .header("authorization", &format!("Bearer {}", self.core.api_key()));

        debug!(
            provider = "openai-compatible",
            model = %model,
            base_url = %self.core.transport().base_url(),
            "opening chat completions stream"
        );
        Ok(self
            .core
            .sse_session(http, map_event, request.session_token()))
    }
}
