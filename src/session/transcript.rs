use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::warn;

use crate::normalize::NormalizedError;
use crate::types::{Chunk, ProviderId, Status, Usage};

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Error(Arc<NormalizedError>),
}

/// Consumer-side fold over a chunk sequence.
///
/// Keeps what a renderer needs: text in emission order, the latest usage and
/// status, and the terminal outcome. Chunks arriving after the terminal chunk
/// are dropped.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    provider_id: Option<ProviderId>,
    model: Option<String>,
    text: String,
    usage: Option<Usage>,
    status: Option<Status>,
    status_detail: Option<String>,
    outcome: Option<Outcome>,
    chunks_seen: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `chunks` to its end and fold every chunk.
    pub async fn collect<S>(chunks: S) -> Self
    where
        S: Stream<Item = Chunk>,
    {
        let mut transcript = Self::new();
        let mut chunks = std::pin::pin!(chunks);
        while let Some(chunk) = chunks.next().await {
            transcript.push(chunk);
        }
        transcript
    }

    pub fn push(&mut self, chunk: Chunk) {
        if self.outcome.is_some() {
            warn!(?chunk, "chunk after terminal chunk dropped");
            return;
        }
        self.chunks_seen += 1;
        match chunk {
            Chunk::Meta { provider_id, model } => {
                self.provider_id = Some(provider_id);
                self.model = Some(model);
            }
            Chunk::Status { value, detail } => {
                self.status = Some(value);
                self.status_detail = detail;
            }
            Chunk::Text { payload } => self.text.push_str(&payload),
            Chunk::Usage(usage) => self.usage = Some(usage),
            Chunk::Error { error } => self.outcome = Some(Outcome::Error(error)),
            Chunk::Done => self.outcome = Some(Outcome::Done),
        }
    }

    pub fn provider_id(&self) -> Option<ProviderId> {
        self.provider_id
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn status_detail(&self) -> Option<&str> {
        self.status_detail.as_deref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn error(&self) -> Option<&Arc<NormalizedError>> {
        match &self.outcome {
            Some(Outcome::Error(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn chunks_seen(&self) -> usize {
        self.chunks_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ErrorKind;
    use futures::stream;

    #[tokio::test]
    async fn latest_usage_wins_and_text_concatenates() {
        let chunks = vec![
            Chunk::Meta {
                provider_id: ProviderId::Gemini,
                model: "gemini-1.5-flash".into(),
            },
            Chunk::status(Status::Running),
            Chunk::text("Hel"),
            Chunk::Usage(Usage::from_counts(None, None, Some(3))),
            Chunk::text("lo"),
            Chunk::Usage(Usage::from_counts(None, None, Some(7))),
            Chunk::status(Status::Completed),
            Chunk::Done,
        ];
        let t = Transcript::collect(stream::iter(chunks)).await;
        assert_eq!(t.text(), "Hello");
        assert_eq!(t.usage().and_then(|u| u.total_tokens), Some(7));
        assert_eq!(t.status(), Some(Status::Completed));
        assert_eq!(t.outcome(), Some(&Outcome::Done));
        assert_eq!(t.model(), Some("gemini-1.5-flash"));
    }

    #[test]
    fn nothing_after_terminal_is_kept() {
        let mut t = Transcript::new();
        t.push(Chunk::Error {
            error: Arc::new(NormalizedError::new(ErrorKind::Provider, "boom")),
        });
        t.push(Chunk::text("late"));
        t.push(Chunk::Done);
        assert_eq!(t.text(), "");
        assert_eq!(t.error().map(|e| e.message()), Some("boom"));
        assert_eq!(t.chunks_seen(), 1);
    }
}
