//! Anthropic Messages API 驱动：实现 Anthropic 特有的请求/流式事件转换
//!
//! Anthropic Messages API driver. Handles the key differences from OpenAI:
//! - System messages are a top-level `system` parameter, not part of `messages`.
//! - Streaming uses typed events (`message_start`, `content_block_delta`, ...).
//! - Usage is split: input tokens at `message_start`, output tokens at `message_delta`.
//! - `max_tokens` is required, not optional.
//!
//! This is the agent-style vendor: `tool_use` and server tool result blocks
//! surface as `status(running, "tool: <name>")` details, never as text.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{count, DriverCore, ProviderDriver};
use crate::normalize::RawFault;
use crate::types::message::split_system;
use crate::types::{ProtocolEvent, ProviderEnv, ProviderId, SessionRequest, Usage};
use crate::{ChunkStream, FaultResult, Result};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API driver.
#[derive(Debug, Clone)]
pub struct AnthropicDriver {
    core: DriverCore,
}

impl AnthropicDriver {
    pub fn new(env: ProviderEnv) -> Result<Self> {
        Ok(Self {
            core: DriverCore::new(ProviderId::Anthropic, env)?,
        })
    }

    pub fn build_body(request: &SessionRequest, model: &str) -> Value {
        let (system, turns) =
            split_system(request.system.as_deref(), &request.prompt.to_messages());

        let mut body = json!({
            "model": model,
            "messages": turns,
            "max_tokens": request.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        if let Some(sys) = system {
            body["system"] = Value::String(sys);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

/// Per-session mapping state: Anthropic reports usage in two halves.
#[derive(Debug, Default)]
pub struct EventMapper {
    usage: Usage,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, frame: Value) -> FaultResult<Vec<ProtocolEvent>> {
        let event_type = frame.get("type").and_then(|t| t.as_str()).unwrap_or("");

        let events = match event_type {
            "message_start" => {
                let mut out = vec![ProtocolEvent::running()];
                out.extend(self.absorb_usage(frame.pointer("/message/usage")));
                out
            }
            "content_block_start" => {
                let block = frame.get("content_block").unwrap_or(&Value::Null);
                block_start(block)
            }
            "content_block_delta" => {
                match frame.pointer("/delta/text").and_then(|t| t.as_str()) {
                    Some(text) if !text.is_empty() => vec![ProtocolEvent::Text(text.to_string())],
                    _ => vec![],
                }
            }
            "message_delta" => self.absorb_usage(frame.get("usage")).into_iter().collect(),
            "error" => {
                let error = frame.get("error").unwrap_or(&Value::Null);
                return Err(RawFault::Json(json!({
                    "code": error.get("type").cloned().unwrap_or(Value::Null),
                    "message": error.get("message").cloned().unwrap_or(Value::Null),
                })));
            }
            // ping, content_block_stop, message_stop
            _ => vec![],
        };
        Ok(events)
    }

    fn absorb_usage(&mut self, usage: Option<&Value>) -> Option<ProtocolEvent> {
        let u = usage.filter(|u| u.is_object())?;
        self.usage = self.usage.merged(Usage::from_counts(
            count(u, "input_tokens"),
            count(u, "output_tokens"),
            None,
        ));
        Some(ProtocolEvent::Usage(self.usage))
    }
}

fn block_start(block: &Value) -> Vec<ProtocolEvent> {
    let block_type = block.get("type").and_then(|t| t.as_str()).unwrap_or("");
    match block_type {
        "text" => match block.get("text").and_then(|t| t.as_str()) {
            Some(text) if !text.is_empty() => vec![ProtocolEvent::Text(text.to_string())],
            _ => vec![],
        },
        "tool_use" | "server_tool_use" | "mcp_tool_use" => {
            let name = block.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
            vec![ProtocolEvent::running_with(format!("tool: {}", name))]
        }
        t if t.ends_with("tool_result") => {
            vec![ProtocolEvent::running_with(format!("tool result: {}", t))]
        }
        _ => vec![],
    }
}

#[async_trait]
impl ProviderDriver for AnthropicDriver {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn default_model(&self) -> Option<&str> {
        self.core.default_model()
    }

    async fn stream(&self, request: SessionRequest) -> Result<ChunkStream> {
        let model = self.core.prepare(&request)?;
        let url = self.core.endpoint("messages")?;
        let body = Self::build_body(&request, &model);
        let http = self
            .core
            .stream_request(url, body, &request)
            .header("x-api-key", self.core.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION);

        debug!(provider = "anthropic", model = %model, "opening messages stream");
        let mut mapper = EventMapper::new();
        Ok(self.core.sse_session(
            http,
            move |frame| mapper.map(frame),
            request.session_token(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::{Message, Status};

    #[test]
    fn system_goes_top_level() {
        let req = SessionRequest::with_messages(
            ProviderId::Anthropic,
            vec![Message::system("You are helpful."), Message::user("Hi")],
        );
        let body = AnthropicDriver::build_body(&req, "claude-3-5-haiku-latest");
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn text_deltas() {
        let mut m = EventMapper::new();
        let ev = m
            .map(json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}))
            .unwrap();
        assert!(matches!(ev.as_slice(), [ProtocolEvent::Text(t)] if t == "Hi"));

        let ev = m
            .map(json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"pa"}}))
            .unwrap();
        assert!(ev.is_empty());
    }

    #[test]
    fn usage_merges_start_and_delta() {
        let mut m = EventMapper::new();
        let ev = m
            .map(json!({
                "type": "message_start",
                "message": { "usage": { "input_tokens": 25, "output_tokens": 1 } }
            }))
            .unwrap();
        assert!(matches!(
            ev[0],
            ProtocolEvent::Status { value: Status::Running, .. }
        ));

        let ev = m
            .map(json!({
                "type": "message_delta",
                "delta": { "stop_reason": "end_turn" },
                "usage": { "output_tokens": 15 }
            }))
            .unwrap();
        match ev.as_slice() {
            [ProtocolEvent::Usage(u)] => {
                assert_eq!(*u, Usage::from_counts(Some(25), Some(15), Some(40)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tool_blocks_become_status_detail() {
        let mut m = EventMapper::new();
        let ev = m
            .map(json!({
                "type": "content_block_start",
                "index": 1,
                "content_block": { "type": "tool_use", "id": "toolu_1", "name": "list_dir", "input": {} }
            }))
            .unwrap();
        match ev.as_slice() {
            [ProtocolEvent::Status { value: Status::Running, detail: Some(d) }] => {
                assert_eq!(d, "tool: list_dir")
            }
            other => panic!("unexpected {:?}", other),
        }

        let ev = m
            .map(json!({
                "type": "content_block_start",
                "index": 2,
                "content_block": { "type": "web_search_tool_result", "tool_use_id": "srvtoolu_1" }
            }))
            .unwrap();
        assert!(matches!(
            ev.as_slice(),
            [ProtocolEvent::Status { detail: Some(d), .. }] if d == "tool result: web_search_tool_result"
        ));
    }

    #[test]
    fn error_event_keeps_vendor_type_as_code() {
        let mut m = EventMapper::new();
        let fault = m
            .map(json!({
                "type": "error",
                "error": { "type": "overloaded_error", "message": "Overloaded" }
            }))
            .unwrap_err();
        assert_eq!(
            normalize(fault, "Anthropic stream error").message(),
            "overloaded_error: Overloaded"
        );
    }
}
