//! 会话运行模块：校验厂商身份，先发出 meta，再原样转发驱动的规范流。
//!
//! # Session Runner
//!
//! The entry point for a chat turn. [`run`] checks that the request targets
//! the provider the binding serves, emits [`Chunk::Meta`], then forwards the
//! driver's chunks verbatim.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_chat_stream::session::{run, ProviderBinding, Transcript};
//! use ai_chat_stream::types::{ProviderEnv, ProviderId, SessionRequest};
//!
//! # async fn demo() -> ai_chat_stream::Result<()> {
//! let binding = ProviderBinding::from_env(ProviderId::Anthropic, ProviderEnv::new("sk-ant-..."))?;
//! let chunks = run(&binding, SessionRequest::new(ProviderId::Anthropic, "Hello")).await?;
//! let transcript = Transcript::collect(chunks).await;
//! println!("{}", transcript.text());
//! # Ok(())
//! # }
//! ```

mod transcript;

pub use transcript::{Outcome, Transcript};

use futures::{stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::drivers::{create_driver, ProviderDriver};
use crate::error::Error;
use crate::types::{Chunk, ProviderEnv, ProviderId, SessionRequest};
use crate::{ChunkStream, Result};

/// A driver paired with the identity it claims to implement.
#[derive(Clone)]
pub struct ProviderBinding {
    provider_id: ProviderId,
    driver: Arc<dyn ProviderDriver>,
}

impl ProviderBinding {
    pub fn new(driver: Arc<dyn ProviderDriver>) -> Self {
        Self {
            provider_id: driver.provider_id(),
            driver,
        }
    }

    /// Build the driver for `provider_id` and bind it.
    pub fn from_env(provider_id: ProviderId, env: ProviderEnv) -> Result<Self> {
        Ok(Self::new(create_driver(provider_id, env)?))
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn driver(&self) -> &Arc<dyn ProviderDriver> {
        &self.driver
    }
}

impl fmt::Debug for ProviderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("provider_id", &self.provider_id)
            .field("driver", &self.driver)
            .finish()
    }
}

/// Start a session.
///
/// Fails with a configuration error, without touching the driver, when the
/// request targets a different provider than the binding serves. Otherwise the
/// returned stream starts with `meta` and ends with exactly one of `done` or
/// `error`.
pub async fn run(binding: &ProviderBinding, request: SessionRequest) -> Result<ChunkStream> {
    if request.provider_id != binding.provider_id {
        return Err(Error::provider_mismatch(
            binding.provider_id,
            request.provider_id,
        ));
    }

    let model = request
        .requested_model()
        .or_else(|| binding.driver.default_model())
        .map(String::from)
        .ok_or_else(|| Error::missing_model(binding.provider_id))?;

    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = SessionRequest {
        model: Some(model.clone()),
        session_id: Some(session_id.clone()),
        ..request
    };

    let span = info_span!(
        "session",
        provider = %binding.provider_id,
        model = %model,
        session_id = %session_id
    );
    let body = binding
        .driver
        .stream(request)
        .instrument(span.clone())
        .await?;
    span.in_scope(|| debug!("session started"));

    let meta = Chunk::Meta {
        provider_id: binding.provider_id,
        model,
    };
    Ok(Box::pin(stream::once(async move { meta }).chain(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{wrap_lifecycle, FallbackMessages, VendorStream};
    use crate::types::{ProtocolEvent, Status};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned events through the lifecycle wrapper.
    #[derive(Debug)]
    struct ScriptedDriver {
        provider: ProviderId,
        calls: Arc<AtomicUsize>,
        events: Vec<ProtocolEvent>,
    }

    #[async_trait]
    impl ProviderDriver for ScriptedDriver {
        fn provider_id(&self) -> ProviderId {
            self.provider
        }

        fn default_model(&self) -> Option<&str> {
            Some("scripted-1")
        }

        async fn stream(&self, request: SessionRequest) -> Result<ChunkStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<_> = self.events.iter().cloned().map(Ok).collect();
            Ok(wrap_lifecycle(
                move |_| async move {
                    Ok(Box::pin(stream::iter(items)) as VendorStream<ProtocolEvent>)
                },
                |e| Ok(vec![e]),
                FallbackMessages::for_vendor("Scripted"),
                request.session_token(),
            ))
        }
    }

    fn binding(events: Vec<ProtocolEvent>) -> (ProviderBinding, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let driver = ScriptedDriver {
            provider: ProviderId::OpenAi,
            calls: calls.clone(),
            events,
        };
        (ProviderBinding::new(Arc::new(driver)), calls)
    }

    #[tokio::test]
    async fn mismatch_fails_before_driver_is_called() {
        let (binding, calls) = binding(vec![]);
        let err = run(&binding, SessionRequest::new(ProviderId::Gemini, "hi"))
            .await
            .err()
            .expect("mismatch must fail");
        assert!(err.is_configuration());
        assert!(err.message().starts_with("provider mismatch"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn meta_leads_and_model_resolves() {
        let (binding, calls) = binding(vec![ProtocolEvent::Text("hey".into())]);
        let chunks: Vec<Chunk> = run(&binding, SessionRequest::new(ProviderId::OpenAi, "hi"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            chunks[0],
            Chunk::Meta {
                provider_id: ProviderId::OpenAi,
                model: "scripted-1".into()
            }
        );
        assert_eq!(chunks[1], Chunk::status(Status::Running));
        assert_eq!(chunks.last(), Some(&Chunk::Done));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
