//! Provider 驱动抽象层：通过 trait 实现多厂商流式协议的动态分发
//!
//! Provider driver abstraction layer. Each driver turns a [`SessionRequest`]
//! into the canonical chunk sequence for one vendor wire format:
//!
//! | Driver | Provider | Wire format |
//! |--------|----------|-------------|
//! | [`OpenAiDriver`] | `openai` | Responses API SSE |
//! | [`ChatCompletionsDriver`] | `openai-compatible` | Chat Completions SSE |
//! | [`AnthropicDriver`] | `anthropic` | Messages API SSE |
//! | [`GeminiDriver`] | `gemini` | `streamGenerateContent?alt=sse` |
//!
//! Uses `Arc<dyn ProviderDriver>` for runtime polymorphism, so the session
//! runner and the connectivity prober work with any of them.

pub mod anthropic;
pub mod chat_completions;
pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, ErrorContext};
use crate::normalize::{NormalizedError, RawFault};
use crate::pipeline::{wrap_lifecycle, FallbackMessages, SseDecoder};
use crate::transport::{HttpTransport, StreamRequest};
use crate::types::{Chunk, ProtocolEvent, ProviderEnv, ProviderId, SessionRequest};
use crate::{ChunkStream, FaultResult, Result};

pub use anthropic::AnthropicDriver;
pub use chat_completions::ChatCompletionsDriver;
pub use gemini::GeminiDriver;
pub use openai::OpenAiDriver;

/// Output budget for connectivity pings. OpenAI's Responses API rejects
/// anything lower.
pub const PING_MAX_OUTPUT_TOKENS: u32 = 16;

/// Core trait for provider-specific stream adaptation.
///
/// The trait is object-safe and supports dynamic dispatch via `Arc<dyn ProviderDriver>`.
#[async_trait]
pub trait ProviderDriver: Send + Sync + fmt::Debug {
    /// The identity this driver implements.
    fn provider_id(&self) -> ProviderId;

    /// Model used when the request names none.
    fn default_model(&self) -> Option<&str>;

    /// Start a session.
    ///
    /// Returns `Err` only for configuration problems found before any network
    /// I/O (no resolvable model, request for another provider). Everything
    /// after that arrives in the stream as `status(failed)` + `error`.
    async fn stream(&self, request: SessionRequest) -> Result<ChunkStream>;

    /// Run the cheapest real completion and report the first failure.
    async fn ping(&self, cancel: CancellationToken) -> std::result::Result<(), Arc<NormalizedError>> {
        let request = SessionRequest::new(self.provider_id(), "ping")
            .max_output_tokens(PING_MAX_OUTPUT_TOKENS)
            .cancel_token(cancel);
        let mut chunks = self.stream(request).await.map_err(Error::normalized)?;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Chunk::Error { error } => return Err(error),
                Chunk::Done => return Ok(()),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Build the driver for `provider` from its credentials.
pub fn create_driver(provider: ProviderId, env: ProviderEnv) -> Result<Arc<dyn ProviderDriver>> {
    Ok(match provider {
        ProviderId::OpenAi => Arc::new(OpenAiDriver::new(env)?),
        ProviderId::OpenAiCompatible => Arc::new(ChatCompletionsDriver::new(env)?),
        ProviderId::Anthropic => Arc::new(AnthropicDriver::new(env)?),
        ProviderId::Gemini => Arc::new(GeminiDriver::new(env)?),
    })
}

/// State every driver carries: who it is, its key, its model default and a
/// transport bound to its base URL.
#[derive(Clone)]
pub(crate) struct DriverCore {
    provider: ProviderId,
    api_key: String,
    default_model: Option<String>,
    transport: HttpTransport,
}

impl DriverCore {
    pub(crate) fn new(provider: ProviderId, env: ProviderEnv) -> Result<Self> {
        if !env.has_api_key() {
            return Err(Error::missing_api_key(provider));
        }
        let base_url = env
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or_else(|| provider.default_base_url())
            .ok_or_else(|| {
                Error::configuration_with_context(
                    format!(
                        "{} needs a base URL: set {}_BASE_URL",
                        provider.vendor_name(),
                        provider.env_prefix()
                    ),
                    ErrorContext::new()
                        .with_field_path("env.base_url")
                        .with_source(provider.id()),
                )
            })?;
        let transport = HttpTransport::new(base_url)?;
        let default_model = env
            .default_model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(Self {
            provider,
            api_key: env.api_key.trim().to_string(),
            default_model,
            transport,
        })
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub(crate) fn default_model(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .or_else(|| self.provider.builtin_model())
    }

    /// Checks that run before any I/O: provider identity, then model
    /// (request → env default → built-in).
    pub(crate) fn prepare(&self, request: &SessionRequest) -> Result<String> {
        if request.provider_id != self.provider {
            return Err(Error::provider_mismatch(self.provider, request.provider_id));
        }
        request
            .requested_model()
            .or_else(|| self.default_model())
            .map(String::from)
            .ok_or_else(|| Error::missing_model(self.provider))
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.transport.endpoint(path)
    }

    /// A POST to `url` carrying the session's correlation id.
    pub(crate) fn stream_request(
        &self,
        url: Url,
        body: Value,
        request: &SessionRequest,
    ) -> StreamRequest {
        let req = StreamRequest::new(url, body);
        match &request.session_id {
            Some(id) => req.header("x-request-id", id),
            None => req,
        }
    }

    /// Open `http` as an SSE stream and run its frames through `map` inside
    /// the lifecycle wrapper.
    pub(crate) fn sse_session<M>(
        &self,
        http: StreamRequest,
        map: M,
        cancel: CancellationToken,
    ) -> ChunkStream
    where
        M: FnMut(Value) -> FaultResult<Vec<ProtocolEvent>> + Send + 'static,
    {
        let transport = self.transport.clone();
        wrap_lifecycle(
            move |token| async move {
                let bytes = transport.open_stream(http, token).await?;
                Ok::<_, RawFault>(SseDecoder::new().decode_stream(bytes))
            },
            map,
            FallbackMessages::for_vendor(self.provider.vendor_name()),
            cancel,
        )
    }
}

impl fmt::Debug for DriverCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCore")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("default_model", &self.default_model)
            .field("base_url", &self.transport.base_url().as_str())
            .finish()
    }
}

/// Read an optional `u64` token count.
pub(crate) fn count(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(|n| n.as_u64())
}
