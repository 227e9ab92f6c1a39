//! 类型系统模块：定义与厂商无关的规范协议数据类型。
//!
//! # Types Module
//!
//! The canonical vocabulary every other module speaks. Adapters map vendor
//! events onto these types and never extend them.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Chunk`] | One element of a session's output sequence |
//! | [`Status`] | Lifecycle status values |
//! | [`Usage`] | Token accounting (latest value wins) |
//! | [`ProtocolEvent`] | What an adapter's mapping function emits |
//! | [`SessionRequest`] | Input to one session |
//! | [`ProviderId`] | Closed set of supported vendors |
//! | [`ProviderEnv`] | Credentials and overrides for one vendor |
//!
//! ## Example
//!
//! ```rust
//! use ai_chat_stream::types::{Message, ProviderId, SessionRequest};
//!
//! let req = SessionRequest::with_messages(
//!     ProviderId::Anthropic,
//!     vec![Message::user("What's the weather?")],
//! )
//! .system("You are a helpful assistant")
//! .temperature(0.2);
//! assert_eq!(req.provider_id, ProviderId::Anthropic);
//! ```

pub mod chunk;
pub mod message;
pub mod provider;
pub mod request;

pub use chunk::{Chunk, ProtocolEvent, Status, Usage};
pub use message::{Message, MessageRole};
pub use provider::{ProviderEnv, ProviderId};
pub use request::{Prompt, SessionRequest};
