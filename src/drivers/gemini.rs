//! Gemini Generate API 驱动：直接实现生命周期契约，不经过通用包装器
//!
//! Google Gemini `streamGenerateContent` driver. Key differences:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles: `user` and `model` (not `assistant`). System uses `systemInstruction`.
//! - `generationConfig` wraps temperature and `maxOutputTokens`.
//! - Every stream frame is a full `GenerateContentResponse` carrying text
//!   deltas and a running `usageMetadata`, so frames are read whole rather
//!   than mapped event by event.
//!
//! The lifecycle (running first, usage + completed + done on exhaustion,
//! failed + error otherwise, one release) is reproduced here directly.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

use super::{count, DriverCore, ProviderDriver};
use crate::normalize::{normalize, RawFault};
use crate::pipeline::{FallbackMessages, ReleaseGuard, SseDecoder};
use crate::types::message::split_system;
use crate::types::{Chunk, MessageRole, ProviderEnv, ProviderId, SessionRequest, Status, Usage};
use crate::{BoxStream, ChunkStream, FaultResult, Result};

/// Google Gemini streamGenerateContent driver.
#[derive(Debug, Clone)]
pub struct GeminiDriver {
    core: DriverCore,
}

impl GeminiDriver {
    pub fn new(env: ProviderEnv) -> Result<Self> {
        Ok(Self {
            core: DriverCore::new(ProviderId::Gemini, env)?,
        })
    }

    pub fn build_body(request: &SessionRequest) -> Value {
        let (system, turns) =
            split_system(request.system.as_deref(), &request.prompt.to_messages());
        let contents: Vec<Value> = turns
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if let Some(sys) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": sys }] });
        }
        let mut config = serde_json::Map::new();
        if let Some(t) = request.temperature {
            config.insert("temperature".into(), json!(t));
        }
        if let Some(max) = request.max_output_tokens {
            config.insert("maxOutputTokens".into(), json!(max));
        }
        if !config.is_empty() {
            body["generationConfig"] = Value::Object(config);
        }
        body
    }
}

/// What one `GenerateContentResponse` frame contributes.
#[derive(Debug, Default, PartialEq)]
pub struct FrameContent {
    pub texts: Vec<String>,
    pub usage: Option<Usage>,
}

/// Read one frame. In-band errors and blocked prompts are faults.
pub fn read_frame(frame: &Value) -> FaultResult<FrameContent> {
    if let Some(error) = frame.get("error").filter(|e| !e.is_null()) {
        let code = error
            .get("status")
            .filter(|s| s.is_string())
            .or_else(|| error.get("code"))
            .cloned()
            .unwrap_or(Value::Null);
        return Err(RawFault::Json(json!({
            "code": code,
            "message": error.get("message").cloned().unwrap_or(Value::Null),
        })));
    }
    if let Some(reason) = frame
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        return Err(RawFault::Json(json!({
            "code": "prompt_blocked",
            "message": format!("Gemini blocked the prompt ({})", reason),
        })));
    }

    let texts = frame
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p.get("thought").and_then(|t| t.as_bool()).unwrap_or(false))
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let usage = frame.get("usageMetadata").filter(|u| u.is_object()).map(|u| {
        Usage::from_counts(
            count(u, "promptTokenCount"),
            count(u, "candidatesTokenCount"),
            count(u, "totalTokenCount"),
        )
    });

    Ok(FrameContent { texts, usage })
}

type Frames = BoxStream<'static, Value>;

enum Stage {
    Opening(BoxFuture<'static, FaultResult<Frames>>),
    Reading(Frames),
    Closed,
}

struct GeminiSession {
    stage: Stage,
    usage: Option<Usage>,
    fallbacks: FallbackMessages,
    cancel: CancellationToken,
    guard: ReleaseGuard,
}

impl GeminiSession {
    /// Advance one step; `None` once the terminal chunk has been handed out.
    async fn step(&mut self) -> Option<Vec<Chunk>> {
        match std::mem::replace(&mut self.stage, Stage::Closed) {
            Stage::Closed => {
                self.guard.release();
                None
            }
            Stage::Opening(opening) => {
                let opened = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(RawFault::Cancelled),
                    r = opening => r,
                };
                Some(match opened {
                    Ok(frames) => {
                        self.stage = Stage::Reading(frames);
                        Vec::new()
                    }
                    Err(fault) => {
                        let fallback = self.fallbacks.open.clone();
                        self.close_failed(fault, &fallback)
                    }
                })
            }
            Stage::Reading(mut frames) => {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Some(Err(RawFault::Cancelled)),
                    n = frames.next() => n,
                };
                let fallback = self.fallbacks.stream.clone();
                Some(match next {
                    None => self.close_completed(),
                    Some(Err(fault)) => self.close_failed(fault, &fallback),
                    Some(Ok(frame)) => match read_frame(&frame) {
                        Ok(content) => {
                            self.stage = Stage::Reading(frames);
                            if content.usage.is_some() {
                                self.usage = content.usage;
                            }
                            content.texts.into_iter().map(Chunk::text).collect()
                        }
                        Err(fault) => self.close_failed(fault, &fallback),
                    },
                })
            }
        }
    }

    fn close_completed(&mut self) -> Vec<Chunk> {
        let mut out = Vec::with_capacity(3);
        if let Some(usage) = self.usage.take() {
            out.push(Chunk::Usage(usage));
        }
        out.push(Chunk::status(Status::Completed));
        out.push(Chunk::Done);
        debug!("gemini session completed");
        self.guard.release();
        out
    }

    fn close_failed(&mut self, fault: RawFault, fallback: &str) -> Vec<Chunk> {
        let error = normalize(fault, fallback);
        if error.is_cancelled() {
            warn!("gemini session cancelled");
        } else {
            debug!(error = %error, "gemini session failed");
        }
        self.guard.release();
        vec![Chunk::status(Status::Failed), Chunk::Error { error }]
    }
}

#[async_trait]
impl ProviderDriver for GeminiDriver {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn default_model(&self) -> Option<&str> {
        self.core.default_model()
    }

    async fn stream(&self, request: SessionRequest) -> Result<ChunkStream> {
        let model = self.core.prepare(&request)?;
        let model_path = model.trim_start_matches("models/");
        let url = self
            .core
            .endpoint(&format!("models/{}:streamGenerateContent?alt=sse", model_path))?;
        let body = Self::build_body(&request);
        let http = self
            .core
            .stream_request(url, body, &request)
            .header("x-goog-api-key", self.core.api_key());

        debug!(provider = "gemini", model = %model, "opening generate stream");

        let cancel = request.session_token();
        let guard = ReleaseGuard::new(cancel.child_token());
        let token = guard.token();
        let transport = self.core.transport().clone();
        let opening: BoxFuture<'static, FaultResult<Frames>> = Box::pin(async move {
            let bytes = transport.open_stream(http, token).await?;
            Ok::<_, RawFault>(SseDecoder::new().decode_stream(bytes))
        });

        Ok(session_stream(opening, cancel, guard))
    }
}

/// Run the step machine: `running` first, then whatever each step yields.
fn session_stream(
    opening: BoxFuture<'static, FaultResult<Frames>>,
    cancel: CancellationToken,
    guard: ReleaseGuard,
) -> ChunkStream {
    let session = GeminiSession {
        stage: Stage::Opening(opening),
        usage: None,
        fallbacks: FallbackMessages::for_vendor(ProviderId::Gemini.vendor_name()),
        cancel,
        guard,
    };

    let span = Span::current();
    let body = stream::unfold(session, move |mut s| {
        async move {
            let chunks = s.step().await?;
            Some((stream::iter(chunks), s))
        }
        .instrument(span.clone())
    })
    .flatten();

    Box::pin(stream::once(async { Chunk::status(Status::Running) }).chain(body))
}
