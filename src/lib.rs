//! # ai-chat-stream
//!
//! 多厂商大模型流式协议归一化层：把各厂商各异的事件流转换为统一的规范 chunk 序列。
//!
//! Provider-agnostic streaming chat runtime. Each vendor's event stream is
//! turned into one canonical chunk sequence with a uniform lifecycle, a
//! uniform error shape, and uniform cancellation semantics.
//!
//! ## Overview
//!
//! ```text
//! SessionRequest → ProviderDriver (via wrap_lifecycle) → chunks → session::run → consumer
//!                         ↑ CancellationToken flows back down to the HTTP call
//! ```
//!
//! Every session's sequence starts with exactly one `meta` chunk and ends with
//! exactly one terminal chunk: `done` after `status(completed)` on success, or
//! `error` after `status(failed)` on failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_chat_stream::{run, Chunk, ProviderBinding, ProviderEnv, ProviderId, SessionRequest};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> ai_chat_stream::Result<()> {
//!     let env = ProviderEnv::new("your-api-key");
//!     let binding = ProviderBinding::from_env(ProviderId::OpenAi, env)?;
//!
//!     let mut chunks = run(&binding, SessionRequest::new(ProviderId::OpenAi, "Hello!")).await?;
//!     while let Some(chunk) = chunks.next().await {
//!         match chunk {
//!             Chunk::Text { payload } => print!("{}", payload),
//!             Chunk::Error { error } => eprintln!("\n{}", error),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Canonical chunk vocabulary, requests, provider identity |
//! | [`normalize`] | Error normalizer: every fault becomes one [`NormalizedError`] |
//! | [`pipeline`] | SSE decoding and the lifecycle wrapper |
//! | [`transport`] | reqwest-based HTTP transport with cancellable byte streams |
//! | [`drivers`] | Provider adapters (OpenAI, OpenAI-compatible, Anthropic, Gemini) |
//! | [`session`] | Session runner and consumer-side transcript |
//! | [`probe`] | Bounded-time connectivity checks |

pub mod drivers;
pub mod error_code;
pub mod normalize;
pub mod pipeline;
pub mod probe;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use drivers::{create_driver, ProviderDriver};
pub use normalize::{normalize, ErrorKind, NormalizedError, RawFault};
pub use probe::{probe, probe_env, probe_with, DEFAULT_PROBE_TIMEOUT, PROBE_TIMEOUT_MESSAGE};
pub use session::{run, ProviderBinding, Transcript};
pub use types::{
    Chunk, Message, MessageRole, ProtocolEvent, ProviderEnv, ProviderId, SessionRequest, Status,
    Usage,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for stream stages, before faults are normalized
pub type FaultResult<T> = std::result::Result<T, RawFault>;

/// A unified pinned, boxed stream that emits `FaultResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = FaultResult<T>> + Send + 'a>>;

/// A session's canonical output.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Chunk> + Send + 'static>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
