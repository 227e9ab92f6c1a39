//! Streaming decoder (Bytes -> JSON Value)
//!
//! Every supported vendor streams Server-Sent Events whose `data:` payloads are
//! JSON objects. The decoder only understands the framing; what a frame means
//! is left to each driver's mapping function.

use crate::normalize::{ErrorKind, RawFault};
use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

/// A frame that could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed stream frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed stream frame: not an event stream: {0}")]
    NotEventStream(String),
}

/// What one SSE frame amounts to once its field lines are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Comments, keep-alives, and frames with no `data:` field.
    Empty,
    /// The vendor's end-of-stream sentinel.
    Done,
    /// The joined `data:` payload.
    Data(String),
    /// A line that is neither a comment nor an SSE field (first one found).
    Malformed(String),
}

/// SSE decoder:
/// - splits by blank line (CRLF tolerated)
/// - joins the frame's `data:` lines, ignoring `event:`, `id:`, `retry:` and comments
/// - stops on `done_signal` (default "[DONE]")
#[derive(Debug, Clone)]
pub struct SseDecoder {
    done_signal: String,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            done_signal: "[DONE]".to_string(),
        }
    }

    pub fn with_done_signal(mut self, signal: impl Into<String>) -> Self {
        self.done_signal = signal.into();
        self
    }

    pub fn parse_frame(&self, frame: &str) -> SseFrame {
        let mut data: Vec<&str> = Vec::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("data:") {
                data.push(rest.strip_prefix(' ').unwrap_or(rest));
            } else if !is_field_or_comment(line) {
                return SseFrame::Malformed(excerpt(line));
            }
        }
        if data.is_empty() {
            return SseFrame::Empty;
        }
        let payload = data.join("\n");
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            SseFrame::Empty
        } else if trimmed == self.done_signal {
            SseFrame::Done
        } else {
            SseFrame::Data(trimmed.to_string())
        }
    }

    /// Turn a byte stream into a stream of JSON frames.
    ///
    /// The output ends at the done signal, at end of input, or right after the
    /// first error (transport fault or malformed frame).
    pub fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let decoder = self.clone();

        // `scanned` is how much of `buf` is known to hold no frame end.
        let stream = stream::unfold(
            Some((input, Vec::<u8>::new(), 0usize)),
            move |state| {
                let decoder = decoder.clone();
                async move {
                    let (mut input, mut buf, mut scanned) = state?;
                    loop {
                        match find_frame_end(&buf, scanned) {
                            Some(idx) => {
                                let frame: Vec<u8> = buf.drain(..idx + 2).collect();
                                scanned = 0;
                                let text = String::from_utf8_lossy(&frame[..idx]);
                                match decoder.parse_frame(&text) {
                                    SseFrame::Empty => continue,
                                    SseFrame::Done => return None,
                                    SseFrame::Data(payload) => {
                                        return match parse_json(&payload) {
                                            Ok(v) => Some((Ok(v), Some((input, buf, scanned)))),
                                            Err(e) => Some((Err(e), None)),
                                        };
                                    }
                                    SseFrame::Malformed(line) => {
                                        return Some((Err(not_event_stream(line)), None));
                                    }
                                }
                            }
                            None => scanned = buf.len(),
                        }

                        match input.next().await {
                            Some(Ok(bytes)) => {
                                buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                            }
                            Some(Err(e)) => return Some((Err(e), None)),
                            None => {
                                // EOF: a trailing frame without its blank line still counts.
                                let text = String::from_utf8_lossy(&buf).into_owned();
                                return match decoder.parse_frame(&text) {
                                    SseFrame::Data(payload) => match parse_json(&payload) {
                                        Ok(v) => Some((Ok(v), None)),
                                        Err(e) => Some((Err(e), None)),
                                    },
                                    SseFrame::Malformed(line) => {
                                        Some((Err(not_event_stream(line)), None))
                                    }
                                    SseFrame::Empty | SseFrame::Done => None,
                                };
                            }
                        }
                    }
                }
            },
        );

        Box::pin(stream)
    }
}

/// Position of the first blank line at or after `from`, stepping back one
/// byte so a `\n\n` split across reads is still found.
fn find_frame_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(1);
    buf.get(start..)?
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|i| start + i)
}

/// Comments (`:`), blank lines, and the fields SSE defines.
fn is_field_or_comment(line: &str) -> bool {
    if line.trim().is_empty() || line.starts_with(':') {
        return true;
    }
    let name = line.split_once(':').map_or(line, |(name, _)| name);
    matches!(name, "data" | "event" | "id" | "retry")
}

fn excerpt(line: &str) -> String {
    const MAX_CHARS: usize = 120;
    if line.chars().count() > MAX_CHARS {
        let head: String = line.chars().take(MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

fn not_event_stream(line: String) -> RawFault {
    RawFault::native(ErrorKind::Decode, FrameError::NotEventStream(line))
}

fn parse_json(payload: &str) -> Result<Value, RawFault> {
    serde_json::from_str(payload)
        .map_err(|e| RawFault::native(ErrorKind::Decode, FrameError::from(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn bytes_of(parts: &[&str]) -> BoxStream<'static, Bytes> {
        let owned: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        Box::pin(stream::iter(owned))
    }

    async fn collect(parts: &[&str]) -> Vec<Result<Value, RawFault>> {
        SseDecoder::new()
            .decode_stream(bytes_of(parts))
            .collect()
            .await
    }

    #[test]
    fn frame_fields() {
        let d = SseDecoder::new();
        assert_eq!(d.parse_frame(": keep-alive"), SseFrame::Empty);
        assert_eq!(d.parse_frame("event: ping"), SseFrame::Empty);
        assert_eq!(d.parse_frame("data: [DONE]"), SseFrame::Done);
        assert_eq!(d.parse_frame("id: 7\nretry: 3000"), SseFrame::Empty);
        assert_eq!(
            d.parse_frame("{\"error\":\"nope\"}"),
            SseFrame::Malformed("{\"error\":\"nope\"}".into())
        );
        assert_eq!(
            d.parse_frame("event: message_start\ndata: {\"a\":1}"),
            SseFrame::Data("{\"a\":1}".into())
        );
        assert_eq!(
            d.parse_frame("data:{\"a\":\ndata: 1}"),
            SseFrame::Data("{\"a\":\n1}".into())
        );
    }

    #[tokio::test]
    async fn frames_split_across_reads() {
        let out = collect(&[
            "data: {\"n\":",
            "1}\n\nda",
            "ta: {\"n\":2}\r\n\r\n",
            "data: [DONE]\n\n",
            "data: {\"n\":3}\n\n",
        ])
        .await;
        let values: Vec<Value> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn multibyte_text_split_across_reads() {
        let full = "data: {\"t\":\"héllo\"}\n\n";
        let bytes = full.as_bytes();
        let cut = full.find('é').unwrap() + 1;
        let parts: Vec<Result<Bytes, RawFault>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..cut])),
            Ok(Bytes::copy_from_slice(&bytes[cut..])),
        ];
        let out: Vec<_> = SseDecoder::new()
            .decode_stream(Box::pin(stream::iter(parts)))
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap()["t"], "héllo");
    }

    #[tokio::test]
    async fn trailing_frame_without_blank_line() {
        let out = collect(&["data: {\"last\":true}"]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &json!({"last": true}));
    }

    #[tokio::test]
    async fn malformed_frame_ends_stream_with_decode_fault() {
        let out = collect(&["data: {\"ok\":1}\n\ndata: {nope\n\ndata: {\"ok\":2}\n\n"]).await;
        assert_eq!(out.len(), 2);
        let err = normalize(out[1].clone().unwrap_err(), "stream error");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.message().starts_with("malformed stream frame"));
    }

    #[tokio::test]
    async fn plain_json_body_is_a_decode_fault() {
        let out = collect(&[
            "{\"error\":{\"code\":\"model_not_found\",",
            "\"message\":\"no such model\"}}",
        ])
        .await;
        assert_eq!(out.len(), 1);
        let err = normalize(out[0].clone().unwrap_err(), "stream error");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.message().contains("not an event stream"));
        assert!(err.message().contains("model_not_found"));
    }

    #[tokio::test]
    async fn stray_line_between_frames_ends_stream() {
        let out = collect(&["data: {\"n\":1}\n\n<html>\n\ndata: {\"n\":2}\n\n"]).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &json!({"n": 1}));
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn large_frame_in_small_reads() {
        let text = "x".repeat(64 * 1024);
        let body = format!("data: {{\"t\":\"{}\"}}\n\ndata: {{\"n\":2}}\n\n", text);
        let parts: Vec<Result<Bytes, RawFault>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let out: Vec<_> = SseDecoder::new()
            .decode_stream(Box::pin(stream::iter(parts)))
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap()["t"].as_str().map(str::len), Some(text.len()));
        assert_eq!(out[1].as_ref().unwrap(), &json!({"n": 2}));
    }

    #[test]
    fn frame_end_found_across_scan_boundary() {
        // first read ended on one newline; the second starts with the other
        assert_eq!(find_frame_end(b"data: 1\n", 0), None);
        assert_eq!(find_frame_end(b"data: 1\n\n", 8), Some(7));
        assert_eq!(find_frame_end(b"a\n\nb\n\n", 4), Some(4));
        assert_eq!(find_frame_end(b"", 0), None);
    }

    #[tokio::test]
    async fn transport_fault_is_forwarded() {
        let parts: Vec<Result<Bytes, RawFault>> = vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n\n")),
            Err(RawFault::Text("connection reset".into())),
        ];
        let out: Vec<_> = SseDecoder::new()
            .decode_stream(Box::pin(stream::iter(parts)))
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], Err(RawFault::Text(t)) if t == "connection reset"));
    }
}
