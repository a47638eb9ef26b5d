//! Benchmarks for the two hot paths of a `StreamedPromise`: replaying a
//! fixed piece sequence to many fan-out cursors, and repeated
//! `collect_whole()` calls hitting the memoized fast path.
//!
//! Run with: cargo bench --bench replay

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use futures_util::StreamExt;
use promisegraph::{BoxFuture, PieceStream, SharedError, StreamedPromise};

const PIECE_COUNT: usize = 1_000;

fn string_producer() -> promisegraph::Producer<String, String> {
    Arc::new(|_promise| {
        let items: Vec<Result<String, SharedError>> =
            (0..PIECE_COUNT).map(|i| Ok(i.to_string())).collect();
        Ok(Box::pin(futures_util::stream::iter(items)) as PieceStream<String>)
    })
}

fn concat_packager() -> promisegraph::Packager<String, String> {
    Arc::new(|promise: Arc<StreamedPromise<String, String>>| {
        Box::pin(async move {
            let mut whole = String::new();
            let mut cursor = promise.iterate();
            while let Some(piece) = cursor.next().await {
                whole.push_str(piece.map_err(SharedError::new)?.as_str());
            }
            Ok(whole)
        }) as BoxFuture<Result<String, SharedError>>
    })
}

fn bench_replay_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("replay_fan_out");
    group.throughput(Throughput::Elements(PIECE_COUNT as u64));

    for cursors in [1usize, 8, 64] {
        group.bench_function(format!("{cursors}_cursors"), |b| {
            b.to_async(&rt).iter(|| async {
                let promise = StreamedPromise::new(string_producer(), concat_packager(), false);
                let mut handles = Vec::with_capacity(cursors);
                for _ in 0..cursors {
                    let promise = Arc::clone(&promise);
                    handles.push(tokio::spawn(async move {
                        let mut cursor = promise.iterate();
                        let mut count = 0usize;
                        while cursor.next().await.is_some() {
                            count += 1;
                        }
                        black_box(count)
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_collect_whole_memoized(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("collect_whole");

    group.bench_function("repeated_calls_hit_memo", |b| {
        let promise = StreamedPromise::new(string_producer(), concat_packager(), false);
        rt.block_on(async {
            promise.collect_whole().await.unwrap();
        });

        b.to_async(&rt).iter(|| {
            let promise = Arc::clone(&promise);
            async move { black_box(promise.collect_whole().await.unwrap()) }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_replay_fan_out, bench_collect_whole_memoized);
criterion_main!(benches);
