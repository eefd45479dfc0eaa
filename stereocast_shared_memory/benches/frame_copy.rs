//! Frame write/read throughput benchmarks

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stereocast_shared_memory::{
    AdmissionPolicy, Channel, FrameSnapshot, Intrinsics, Receiver, SyntheticCamera, init_tracing,
};
use std::hint::black_box;
use std::time::Duration;

const RESOLUTIONS: [(u32, u32); 3] = [(640, 480), (1280, 720), (1920, 1080)];

fn bench_namespace(tag: &str, width: u32, height: u32) -> String {
    init_tracing();
    format!("bench_{}_{}x{}_{}", tag, width, height, std::process::id())
}

/// Benchmark a full guarded write of a stereo pair
fn bench_write_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_frame");
    for (width, height) in RESOLUTIONS {
        let camera = SyntheticCamera::new(width, height, 60.0);
        let pair = camera.expected_pair(1);
        let ns = bench_namespace("write", width, height);
        let channel = Channel::create(&ns, &pair.left, &Intrinsics::default(), 60.0).unwrap();

        group.throughput(Throughput::Bytes(2 * pair.left.as_bytes().len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &pair,
            |b, pair| {
                b.iter(|| {
                    black_box(
                        channel
                            .write_frame(pair, AdmissionPolicy::Exclusive, Duration::ZERO)
                            .unwrap(),
                    );
                });
            },
        );
        channel.destroy().unwrap();
    }
    group.finish();
}

/// Benchmark a guarded read into a reused snapshot
fn bench_read_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_frame_into");
    for (width, height) in RESOLUTIONS {
        let camera = SyntheticCamera::new(width, height, 60.0);
        let pair = camera.expected_pair(1);
        let ns = bench_namespace("read", width, height);
        let channel = Channel::create(&ns, &pair.left, &Intrinsics::default(), 60.0).unwrap();
        channel
            .write_frame(&pair, AdmissionPolicy::Exclusive, Duration::ZERO)
            .unwrap();

        let mut receiver = Receiver::attach(&ns).unwrap();
        let mut snapshot = FrameSnapshot::with_resolution(receiver.resolution());

        group.throughput(Throughput::Bytes(2 * pair.left.as_bytes().len() as u64));
        group.bench_function(BenchmarkId::from_parameter(format!("{width}x{height}")), |b| {
            b.iter(|| {
                receiver.read_frame_into(&mut snapshot).unwrap();
                black_box(snapshot.timestamp);
            });
        });

        receiver.detach();
        channel.destroy().unwrap();
    }
    group.finish();
}

/// Benchmark freshness polling when nothing new has been published
fn bench_poll_timestamp(c: &mut Criterion) {
    let camera = SyntheticCamera::new(64, 64, 60.0);
    let ns = bench_namespace("poll", 64, 64);
    let channel =
        Channel::create(&ns, &camera.expected_pair(0).left, &Intrinsics::default(), 60.0).unwrap();
    let receiver = Receiver::attach(&ns).unwrap();

    c.bench_function("has_new_frame", |b| {
        b.iter(|| black_box(receiver.has_new_frame()));
    });

    receiver.detach();
    channel.destroy().unwrap();
}

criterion_group!(
    benches,
    bench_write_frame,
    bench_read_frame,
    bench_poll_timestamp
);
criterion_main!(benches);
