//! 流水线处理模块：把厂商字节流解码为 JSON 帧，并包裹统一的生命周期。
//!
//! # Streaming Pipeline
//!
//! The vendor-neutral half of every provider adapter.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Raw Bytes → SseDecoder → driver mapping fn → wrap_lifecycle → Chunks
//!     │            │               │                  │
//!   HTTP       JSON frames    ProtocolEvent      running / completed /
//!                                                failed + error / done
//! ```
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE framing (bytes → `serde_json::Value`) |
//! | [`lifecycle`] | Status/terminal bracketing, usage capture, resource release |

pub mod decode;
pub mod lifecycle;

pub use decode::{SseDecoder, SseFrame};
pub use lifecycle::{wrap_lifecycle, FallbackMessages, ReleaseGuard, VendorStream};
