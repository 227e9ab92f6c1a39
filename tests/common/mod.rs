//! Mock vendor server shared by the integration tests

#![allow(dead_code)]

use ai_chat_stream::{Chunk, ProviderEnv};
use mockito::{Matcher, Mock, Server, ServerGuard};

pub const TEST_KEY: &str = "test-key";

/// Test fixture that manages a mock vendor endpoint
pub struct MockVendor {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockVendor {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Credentials pointing a driver at this server
    pub fn env(&self) -> ProviderEnv {
        ProviderEnv::new(TEST_KEY).with_base_url(&self.base_url)
    }

    /// Serve `frames` as one SSE body. Frames without a `data:` or `event:`
    /// line get a `data: ` prefix.
    pub async fn mock_sse_stream(&mut self, path: impl Into<Matcher>, frames: &[&str]) -> Mock {
        self.server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(frames))
            .create_async()
            .await
    }

    /// Answer with a non-success status and a raw body
    pub async fn mock_error_response(
        &mut self,
        path: impl Into<Matcher>,
        status: usize,
        body: &str,
    ) -> Mock {
        self.server
            .mock("POST", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}

pub fn sse_body(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|frame| {
            if frame.starts_with("data:") || frame.starts_with("event:") {
                format!("{}\n\n", frame)
            } else {
                format!("data: {}\n\n", frame)
            }
        })
        .collect()
}

/// Assert the sequence ends with exactly one terminal chunk, in last position.
pub fn assert_single_terminal(chunks: &[Chunk]) {
    let terminals = chunks.iter().filter(|c| c.is_terminal()).count();
    assert_eq!(terminals, 1, "expected one terminal chunk in {:?}", chunks);
    assert!(chunks.last().map(Chunk::is_terminal).unwrap_or(false));
}
