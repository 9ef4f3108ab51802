//! Criterion benchmarks for ring buffer hot paths.
//!
//! The frame ring sits on the acquisition hot path, so its push latency
//! bounds the sustainable frame rate. These benchmarks establish baselines
//! for:
//! - push throughput at frame-sized payloads
//! - latest-element read latency under a concurrent writer
//! - full-buffer snapshot cost (the export path)
//!
//! Run with: cargo bench --bench ring_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cyto_daq::data::ring_buffer::RingBuffer;
use std::sync::Arc;
use std::thread;

/// Push throughput for payload sizes bracketing a 512x96 8-bit frame.
fn ring_buffer_push_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_push");

    let sizes = vec![
        ("4KB", 4 * 1024),
        ("48KB_frame", 512 * 96),
        ("256KB", 256 * 1024),
    ];

    for (name, size) in sizes {
        let rb: RingBuffer<Vec<u8>> = RingBuffer::new(64);
        let payload = vec![0u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("push", name), &size, |b, _| {
            b.iter(|| {
                rb.push(black_box(payload.clone()));
            });
        });
    }

    group.finish();
}

/// Read latency for the newest element while a writer hammers the buffer.
fn ring_buffer_read_under_writer(c: &mut Criterion) {
    let rb: Arc<RingBuffer<Vec<u8>>> = Arc::new(RingBuffer::new(64));
    rb.push(vec![0u8; 512 * 96]);

    let writer_rb = Arc::clone(&rb);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let writer_stop = Arc::clone(&stop);
    let writer = thread::spawn(move || {
        let payload = vec![0xAA; 512 * 96];
        while !writer_stop.load(std::sync::atomic::Ordering::Relaxed) {
            writer_rb.push(payload.clone());
        }
    });

    c.bench_function("ring_buffer_latest_contended", |b| {
        b.iter(|| {
            let frame = rb.latest();
            black_box(frame);
        });
    });

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = writer.join();
}

/// Snapshot cost for increasing buffer occupancy (the frame-export path).
fn ring_buffer_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_snapshot");

    for count in [16usize, 64, 256] {
        let rb: RingBuffer<Vec<u8>> = RingBuffer::new(count);
        for _ in 0..count {
            rb.push(vec![0u8; 512 * 96]);
        }
        group.bench_with_input(BenchmarkId::new("snapshot", count), &count, |b, _| {
            b.iter(|| {
                let all = rb.snapshot_oldest_first();
                black_box(all);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    ring_buffer_push_throughput,
    ring_buffer_read_under_writer,
    ring_buffer_snapshot
);
criterion_main!(benches);
