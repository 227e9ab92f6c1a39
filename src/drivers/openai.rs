//! OpenAI Responses API 驱动
//!
//! OpenAI Responses API driver (`POST /responses`, `stream: true`).
//! - System instructions go in the top-level `instructions` field.
//! - Text arrives as `response.output_text.delta`.
//! - Usage arrives once, on `response.completed` / `response.incomplete`.
//! - Failures arrive as `response.failed` or a bare `error` event.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{count, DriverCore, ProviderDriver};
use crate::normalize::RawFault;
use crate::types::message::split_system;
use crate::types::{ProtocolEvent, ProviderEnv, ProviderId, SessionRequest, Usage};
use crate::{ChunkStream, FaultResult, Result};

#[derive(Debug, Clone)]
pub struct OpenAiDriver {
    core: DriverCore,
}

impl OpenAiDriver {
    pub fn new(env: ProviderEnv) -> Result<Self> {
        Ok(Self {
            core: DriverCore::new(ProviderId::OpenAi, env)?,
        })
    }

    pub fn build_body(request: &SessionRequest, model: &str) -> Value {
        let (instructions, turns) =
            split_system(request.system.as_deref(), &request.prompt.to_messages());
        let input: Vec<Value> = turns
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "input": input,
            "stream": true,
        });
        if let Some(sys) = instructions {
            body["instructions"] = Value::String(sys);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = request.max_output_tokens {
            body["max_output_tokens"] = json!(max);
        }
        body
    }
}

/// Map one Responses API event.
pub fn map_event(frame: Value) -> FaultResult<Vec<ProtocolEvent>> {
    let event_type = frame.get("type").and_then(|t| t.as_str()).unwrap_or("");

    let events = match event_type {
        "response.created" | "response.in_progress" => vec![ProtocolEvent::running()],
        "response.output_text.delta" => match frame.get("delta").and_then(|d| d.as_str()) {
            Some(delta) if !delta.is_empty() => vec![ProtocolEvent::Text(delta.to_string())],
            _ => vec![],
        },
        "response.output_item.added" => {
            let item_type = frame
                .pointer("/item/type")
                .and_then(|t| t.as_str())
                .unwrap_or("");
            match item_type {
                "" | "message" | "reasoning" => vec![],
                other => vec![ProtocolEvent::running_with(format!("tool: {}", other))],
            }
        }
        "response.completed" => usage_of(&frame).into_iter().collect(),
        "response.incomplete" => {
            let mut out = Vec::new();
            if let Some(reason) = frame
                .pointer("/response/incomplete_details/reason")
                .and_then(|r| r.as_str())
            {
                out.push(ProtocolEvent::running_with(format!("incomplete: {}", reason)));
            }
            out.extend(usage_of(&frame));
            out
        }
        "response.failed" => {
            let error = frame
                .pointer("/response/error")
                .filter(|e| !e.is_null())
                .cloned()
                .unwrap_or_else(|| json!({}));
            return Err(RawFault::Json(error));
        }
        "error" => return Err(RawFault::Json(frame)),
        _ => vec![],
    };
    Ok(events)
}

fn usage_of(frame: &Value) -> Option<ProtocolEvent> {
    let u = frame.pointer("/response/usage")?;
    if u.is_null() {
        return None;
    }
    Some(ProtocolEvent::Usage(Usage::from_counts(
        count(u, "input_tokens"),
        count(u, "output_tokens"),
        count(u, "total_tokens"),
    )))
}

#[async_trait]
impl ProviderDriver for OpenAiDriver {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn default_model(&self) -> Option<&str> {
        self.core.default_model()
    }

    async fn stream(&self, request: SessionRequest) -> Result<ChunkStream> {
        let model = self.core.prepare(&request)?;
        let url = self.core.endpoint("responses")?;
        let body = Self::build_body(&request, &model);
        let http = self
            .core
            .stream_request(url, body, &request)
            .header("authorization", &format!("Bearer {}", self.core.api_key()));

        debug!(provider = "openai", model = %model, "opening responses stream");
        Ok(self
            .core
            .sse_session(http, map_event, request.session_token()))
    }
}
