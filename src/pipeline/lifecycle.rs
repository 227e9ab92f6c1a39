//! Lifecycle wrapper: brackets a vendor event stream with the canonical
//! status/terminal contract.
//!
//! ```text
//! status(running) → mapped events… → usage? → status(completed) → done
//!                                  ↘ status(failed) → error
//! ```
//!
//! The vendor stream's cancellable resource (a child [`CancellationToken`]) is
//! released exactly once, as the last action on every path, or from `Drop` if
//! the consumer walks away early.

use std::collections::VecDeque;
use std::future::Future;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

use crate::normalize::{normalize, RawFault};
use crate::types::{Chunk, ProtocolEvent, Status, Usage};
use crate::{BoxStream, ChunkStream, FaultResult};

/// A vendor's raw event stream.
pub type VendorStream<E> = BoxStream<'static, E>;

/// Messages used when a fault carries nothing better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackMessages {
    /// The stream could not be opened.
    pub open: String,
    /// The stream failed after it was opened.
    pub stream: String,
}

impl FallbackMessages {
    pub fn new(open: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            stream: stream.into(),
        }
    }

    /// `"<Vendor> request failed"` / `"<Vendor> stream error"`.
    pub fn for_vendor(vendor: &str) -> Self {
        Self::new(
            format!("{} request failed", vendor),
            format!("{} stream error", vendor),
        )
    }
}

/// Owns a session's cancellable resource and cancels it exactly once.
#[derive(Debug)]
pub struct ReleaseGuard {
    token: CancellationToken,
    released: bool,
}

impl ReleaseGuard {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            released: false,
        }
    }

    /// A handle to the guarded token, for the operation that must observe release.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Cancel the guarded token. Later calls are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.token.cancel();
            debug!("vendor stream released");
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Phase<E, O> {
    Opening(O),
    Streaming(VendorStream<E>),
    Finished,
}

struct Lifecycle<E, O, M> {
    phase: Phase<E, O>,
    pending: VecDeque<Chunk>,
    map: M,
    usage: Option<Usage>,
    fallbacks: FallbackMessages,
    cancel: CancellationToken,
    guard: ReleaseGuard,
}

impl<E, O, M> Lifecycle<E, O, M> {
    fn fail(&mut self, fault: RawFault, fallback_is_open: bool) {
        let fallback = if fallback_is_open {
            &self.fallbacks.open
        } else {
            &self.fallbacks.stream
        };
        let error = normalize(fault, fallback);
        if error.is_cancelled() {
            warn!(error = %error, "session cancelled");
        } else {
            debug!(error = %error, kind = ?error.kind(), "session failed");
        }
        self.pending.push_back(Chunk::status(Status::Failed));
        self.pending.push_back(Chunk::Error { error });
        self.finish();
    }

    fn complete(&mut self) {
        if let Some(usage) = self.usage.take() {
            self.pending.push_back(Chunk::Usage(usage));
        }
        self.pending.push_back(Chunk::status(Status::Completed));
        self.pending.push_back(Chunk::Done);
        debug!("session completed");
        self.finish();
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.guard.release();
    }

    /// Queue mapped events; a `Fault` among them fails the session in place.
    fn absorb(&mut self, events: Vec<ProtocolEvent>) {
        for event in events {
            match event {
                ProtocolEvent::Status { value, detail } => {
                    self.pending.push_back(Chunk::Status { value, detail })
                }
                ProtocolEvent::Text(payload) => {
                    if !payload.is_empty() {
                        self.pending.push_back(Chunk::Text { payload });
                    }
                }
                ProtocolEvent::Usage(usage) => self.usage = Some(usage),
                ProtocolEvent::Fault(fault) => {
                    self.fail(fault, false);
                    return;
                }
            }
        }
    }
}

/// Bracket a vendor stream with the canonical lifecycle.
///
/// - `open` receives the session's resource token and opens the vendor stream;
///   the token is cancelled when the session ends, however it ends.
/// - `map` translates one vendor event into zero or more protocol events.
///   Returning `Err` (or emitting [`ProtocolEvent::Fault`]) fails the session.
/// - `cancel` is the caller's token. Firing it while opening or streaming
///   fails the session with a `cancelled` error.
///
/// Usage events are held back and emitted once, after a clean end of stream.
pub fn wrap_lifecycle<E, O, Fut, M>(
    open: O,
    map: M,
    fallbacks: FallbackMessages,
    cancel: CancellationToken,
) -> ChunkStream
where
    E: Send + 'static,
    O: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = FaultResult<VendorStream<E>>> + Send + 'static,
    M: FnMut(E) -> FaultResult<Vec<ProtocolEvent>> + Send + 'static,
{
    let span = Span::current();
    let guard = ReleaseGuard::new(cancel.child_token());
    let state = Lifecycle {
        phase: Phase::Opening(open),
        pending: VecDeque::from([Chunk::status(Status::Running)]),
        map,
        usage: None,
        fallbacks,
        cancel,
        guard,
    };

    let stream = stream::unfold(state, move |mut st| {
        async move {
            loop {
                if let Some(chunk) = st.pending.pop_front() {
                    return Some((chunk, st));
                }

                match std::mem::replace(&mut st.phase, Phase::Finished) {
                    Phase::Finished => {
                        st.guard.release();
                        return None;
                    }
                    Phase::Opening(open) => {
                        let opening = open(st.guard.token());
                        let opened = tokio::select! {
                            biased;
                            _ = st.cancel.cancelled() => Err(RawFault::Cancelled),
                            r = opening => r,
                        };
                        match opened {
                            Ok(vendor) => {
                                debug!("vendor stream opened");
                                st.phase = Phase::Streaming(vendor);
                            }
                            Err(fault) => st.fail(fault, true),
                        }
                    }
                    Phase::Streaming(mut vendor) => {
                        let next = tokio::select! {
                            biased;
                            _ = st.cancel.cancelled() => Some(Err(RawFault::Cancelled)),
                            n = vendor.next() => n,
                        };
                        match next {
                            None => st.complete(),
                            Some(Err(fault)) => st.fail(fault, false),
                            Some(Ok(event)) => match (st.map)(event) {
                                Ok(events) => {
                                    st.phase = Phase::Streaming(vendor);
                                    st.absorb(events);
                                }
                                Err(fault) => st.fail(fault, false),
                            },
                        }
                    }
                }
            }
        }
        .instrument(span.clone())
    });

    Box::pin(stream)
}
