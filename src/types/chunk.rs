//! Canonical chunk vocabulary shared by every adapter and consumer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::normalize::{NormalizedError, RawFault};
use crate::types::ProviderId;

/// Lifecycle status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Token accounting. A later value supersedes an earlier one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// Build from vendor counts, deriving `total` when only the parts are known.
    ///
    /// A derived total that would overflow is left unset.
    pub fn from_counts(input: Option<u64>, output: Option<u64>, total: Option<u64>) -> Self {
        let total = total.or(match (input, output) {
            (Some(i), Some(o)) => i.checked_add(o),
            _ => None,
        });
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none() && self.total_tokens.is_none()
    }

    /// Overlay `newer` on top of `self`, keeping fields `newer` leaves unset.
    ///
    /// Anthropic reports input tokens at message start and output tokens at
    /// message end; merging gives the full picture.
    pub fn merged(self, newer: Usage) -> Usage {
        Usage::from_counts(
            newer.input_tokens.or(self.input_tokens),
            newer.output_tokens.or(self.output_tokens),
            newer.total_tokens,
        )
    }
}

/// One element of a session's output sequence.
///
/// A session always starts with one [`Chunk::Meta`] and ends with exactly one
/// of [`Chunk::Done`] or [`Chunk::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    Meta {
        provider_id: ProviderId,
        model: String,
    },
    Status {
        value: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Text {
        payload: String,
    },
    Usage(Usage),
    Error {
        error: Arc<NormalizedError>,
    },
    Done,
}

impl Chunk {
    pub fn status(value: Status) -> Self {
        Chunk::Status {
            value,
            detail: None,
        }
    }

    pub fn status_with_detail(value: Status, detail: impl Into<String>) -> Self {
        Chunk::Status {
            value,
            detail: Some(detail.into()),
        }
    }

    pub fn text(payload: impl Into<String>) -> Self {
        Chunk::Text {
            payload: payload.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Done | Chunk::Error { .. })
    }
}

/// What an adapter's mapping function produces for one vendor event.
///
/// `meta` and `done` are not representable: they belong to the session runner
/// and the lifecycle wrapper.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    Status {
        value: Status,
        detail: Option<String>,
    },
    Text(String),
    Usage(Usage),
    /// The vendor reported a failure inside an otherwise well-formed event.
    Fault(RawFault),
}

impl ProtocolEvent {
    pub fn running() -> Self {
        ProtocolEvent::Status {
            value: Status::Running,
            detail: None,
        }
    }

    pub fn running_with(detail: impl Into<String>) -> Self {
        ProtocolEvent::Status {
            value: Status::Running,
            detail: Some(detail.into()),
        }
    }
}
