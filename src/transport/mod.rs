//! HTTP transport shared by every driver.

pub mod http;

pub use http::{parse_base_url, HttpTransport, StreamRequest, TransportError};
