//! Benchmarks for streaming pipeline performance
//!
//! This benchmark measures:
//! - SSE frame parsing speed
//! - Byte stream decoding with split reads
//! - Lifecycle wrapping overhead per chunk

use ai_chat_stream::drivers::chat_completions::map_event;
use ai_chat_stream::pipeline::{wrap_lifecycle, FallbackMessages, SseDecoder, VendorStream};
use ai_chat_stream::{Chunk, RawFault};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Sample SSE frames (OpenAI Chat Completions format)
const SSE_FRAMES: &[&str] = &[
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","created":1694268190,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","created":1694268190,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","created":1694268190,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":" there"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","created":1694268190,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","created":1694268190,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":3,"total_tokens":12}}"#,
    "data: [DONE]",
];

fn sse_body() -> String {
    SSE_FRAMES.iter().map(|f| format!("{}\n\n", f)).collect()
}

/// Split `body` into reads of `size` bytes, the way a socket might deliver it.
fn reads(body: &str, size: usize) -> Vec<Bytes> {
    body.as_bytes()
        .chunks(size)
        .map(Bytes::copy_from_slice)
        .collect()
}

fn bench_sse_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sse_parsing");
    let decoder = SseDecoder::new();

    let frame = SSE_FRAMES[1];
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("parse_single_frame", |b| {
        b.iter(|| decoder.parse_frame(black_box(frame)))
    });

    group.finish();
}

fn bench_stream_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_decoding");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let body = sse_body();
    group.throughput(Throughput::Bytes(body.len() as u64));

    for size in [16usize, 256, 4096] {
        let parts = reads(&body, size);
        group.bench_function(format!("decode_reads_of_{}", size), |b| {
            b.to_async(&rt).iter(|| {
                let parts = parts.clone();
                async move {
                    let input =
                        Box::pin(stream::iter(parts.into_iter().map(Ok::<Bytes, RawFault>)));
                    let frames: Vec<_> = SseDecoder::new().decode_stream(input).collect().await;
                    black_box(frames)
                }
            })
        });
    }

    group.finish();
}

fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let parts = reads(&sse_body(), 512);

    group.bench_function("chat_completions_session", |b| {
        b.to_async(&rt).iter(|| {
            let parts = parts.clone();
            async move {
                let chunks: Vec<Chunk> = wrap_lifecycle(
                    move |_| async move {
                        let input =
                            Box::pin(stream::iter(parts.into_iter().map(Ok::<Bytes, RawFault>)));
                        let frames: VendorStream<_> = SseDecoder::new().decode_stream(input);
                        Ok::<_, RawFault>(frames)
                    },
                    map_event,
                    FallbackMessages::for_vendor("Bench"),
                    CancellationToken::new(),
                )
                .collect()
                .await;
                assert_eq!(chunks.last(), Some(&Chunk::Done));
                black_box(chunks)
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_sse_parsing,
    bench_stream_decoding,
    bench_lifecycle
);
criterion_main!(benches);
