//! Criterion benchmarks for bulk_log_shipper

use bulk_log_shipper::core::{
    BatchBuilder, BoundedQueue, BulkPayload, DeliveryError, Formatter, Template,
};
use bulk_log_shipper::prelude::*;
use bulk_log_shipper::transport::BulkResponse;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

/// Accepts everything without doing I/O
struct Discard;

impl BulkTransport for Discard {
    fn send(&mut self, payload: &BulkPayload) -> std::result::Result<BulkResponse, DeliveryError> {
        Ok(BulkResponse::accepted(payload.records()))
    }

    fn name(&self) -> &str {
        "discard"
    }
}

fn sample_event() -> Event {
    Event::new(LogLevel::Info, "request completed")
        .with_attribute("method", "GET")
        .with_attribute("path", "/api/v1/orders")
        .with_attribute("status", 200)
        .with_attribute("duration_ms", 12.5)
}

// ============================================================================
// Formatting Benchmarks
// ============================================================================

fn bench_formatting(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatting");
    group.throughput(Throughput::Elements(1));
    let event = sample_event();

    for (name, format) in [
        ("unix", TimestampFormat::Unix),
        ("iso8601", TimestampFormat::Iso8601),
        ("custom", TimestampFormat::Custom("%Y-%m-%d %H:%M:%S".to_string())),
    ] {
        let formatter = Formatter::new("time", format);
        group.bench_function(name, |b| {
            b.iter(|| black_box(formatter.format(black_box(&event))));
        });
    }

    let mapped = Formatter::new("time", TimestampFormat::Unix).with_mapping(
        FieldMapping::new()
            .attribute("msg", "message")
            .attribute("http_status", "status"),
    );
    group.bench_function("mapped", |b| {
        b.iter(|| black_box(mapped.format(black_box(&event))));
    });

    group.finish();
}

// ============================================================================
// Batch Building Benchmarks
// ============================================================================

fn bench_batch_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_building");
    let formatter = Formatter::new("time", TimestampFormat::Unix);
    let record = formatter.format(&sample_event());
    let builder = BatchBuilder::new(
        Template::parse("logs-{time:%Y.%m.%d}").expect("valid template"),
        None,
        512,
    );

    for size in [16usize, 128, 512] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("drain_{}", size), |b| {
            b.iter_batched(
                || {
                    let queue = BoundedQueue::new(size);
                    for _ in 0..size {
                        let _ = queue.enqueue(record.clone(), false);
                    }
                    queue
                },
                |queue| {
                    let batch = builder.build(&queue, |_, _| {});
                    black_box(batch.payload())
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Submit Benchmarks
// ============================================================================

fn bench_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit");
    group.throughput(Throughput::Elements(1));
    let event = sample_event();

    let handler = Handler::builder()
        .index("bench")
        .queue_capacity(10_000)
        .quiet_diagnostics(true)
        .transport(Box::new(Discard))
        .build()
        .expect("valid configuration");
    group.bench_function("drop_policy", |b| {
        b.iter(|| handler.submit(black_box(&event)));
    });
    handler.close();

    let blocking = Handler::builder()
        .index("bench")
        .queue_capacity(1_000)
        .overflow_policy(OverflowPolicy::Block)
        .quiet_diagnostics(true)
        .transport(Box::new(Discard))
        .build()
        .expect("valid configuration");
    group.bench_function("block_policy", |b| {
        b.iter(|| blocking.submit(black_box(&event)));
    });
    blocking.close();

    group.finish();
}

fn bench_concurrent_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_submit");
    let threads = 4;
    let per_thread = 1_000;
    group.throughput(Throughput::Elements((threads * per_thread) as u64));

    group.bench_function("4_threads_block", |b| {
        b.iter(|| {
            let handler = Arc::new(
                Handler::builder()
                    .index("bench")
                    .queue_capacity(1_000)
                    .overflow_policy(OverflowPolicy::Block)
                    .quiet_diagnostics(true)
                    .transport(Box::new(Discard))
                    .build()
                    .expect("valid configuration"),
            );
            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || {
                        let event = sample_event();
                        for _ in 0..per_thread {
                            handler.submit(&event);
                        }
                    })
                })
                .collect();
            for worker in workers {
                let _ = worker.join();
            }
            handler.close();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_formatting,
    bench_batch_building,
    bench_submit,
    bench_concurrent_submit,
);

criterion_main!(benches);
