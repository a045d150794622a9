use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::{stream, TryStreamExt};
use inferra_client::transport::{ByteStream, TransportError};
use inferra_client::{ChatCompletionChunk, EventStream, RateLimiter};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn bench_acquire(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("rate_limiter_acquire_uncontended", |b| {
        let limiter = RateLimiter::per_minute(u32::MAX, None);
        b.to_async(&rt)
            .iter(|| async { limiter.acquire(black_box(1)).await.unwrap() });
    });

    let mut group = c.benchmark_group("rate_limiter_acquire_contended");
    for tasks in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            let limiter = Arc::new(RateLimiter::per_minute(u32::MAX, None));
            b.to_async(&rt).iter(|| {
                let limiter = Arc::clone(&limiter);
                async move {
                    let handles: Vec<_> = (0..tasks)
                        .map(|_| {
                            let limiter = Arc::clone(&limiter);
                            tokio::spawn(async move { limiter.acquire(1).await })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap().unwrap();
                    }
                }
            });
        });
    }
    group.finish();
}

fn sse_body(chunks: usize) -> Vec<Bytes> {
    let frame = concat!(
        "data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":1,",
        "\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"token \"}}]}\n\n"
    );
    let mut body = frame.repeat(chunks);
    body.push_str("data: [DONE]\n\n");

    // Split at arbitrary boundaries so frames straddle chunks.
    body.as_bytes()
        .chunks(173)
        .map(Bytes::copy_from_slice)
        .collect()
}

fn bench_decode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let body = sse_body(500);

    c.bench_function("event_stream_decode_500_chunks", |b| {
        b.to_async(&rt).iter(|| {
            let parts: Vec<Result<Bytes, TransportError>> =
                body.iter().cloned().map(Ok).collect();
            async move {
                let raw: ByteStream = Box::pin(stream::iter(parts));
                let chunks: Vec<ChatCompletionChunk> =
                    EventStream::from_bytes(raw).try_collect().await.unwrap();
                black_box(chunks.len())
            }
        });
    });
}

criterion_group!(benches, bench_acquire, bench_decode);
criterion_main!(benches);
