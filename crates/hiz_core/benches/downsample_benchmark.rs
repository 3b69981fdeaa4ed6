//! # Downsample Benchmark
//!
//! Measures:
//! 1. Full single-dispatch build at common render resolutions
//! 2. Worker scaling of the software executor
//! 3. Cost of a clean `update()` (must be a branch, not a build)

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hiz_core::{CpuBackend, DepthImage, Extent, HiZBuffer, HizConfig};

fn depth_ramp(extent: Extent) -> Arc<DepthImage> {
    Arc::new(DepthImage::from_fn(extent, |x, y| {
        ((x ^ y) % 251) as f32 / 251.0
    }))
}

fn bench_full_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("hiz_full_build");
    group.sample_size(20);

    for (width, height) in [(640, 360), (1280, 720), (1920, 1080)] {
        let extent = Extent::new(width, height);
        let config = HizConfig::default();
        let mut hiz = HiZBuffer::new(CpuBackend::from_config(&config), config).unwrap();
        hiz.sync(extent).unwrap();
        hiz.set_source(depth_ramp(extent), None);

        group.throughput(Throughput::Elements(extent.area() as u64));
        group.bench_with_input(
            BenchmarkId::new("resolution", format!("{width}x{height}")),
            &extent,
            |b, _| {
                b.iter(|| {
                    hiz.set_dirty();
                    hiz.update().unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("hiz_worker_scaling");
    group.sample_size(20);
    let extent = Extent::new(1920, 1080);

    for workers in [1, 2, 4, 8] {
        let config = HizConfig { workers, ..HizConfig::default() };
        let mut hiz = HiZBuffer::new(CpuBackend::from_config(&config), config).unwrap();
        hiz.sync(extent).unwrap();
        hiz.set_source(depth_ramp(extent), None);

        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
            b.iter(|| {
                hiz.set_dirty();
                hiz.update().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_clean_update(c: &mut Criterion) {
    let extent = Extent::new(1920, 1080);
    let config = HizConfig::default();
    let mut hiz = HiZBuffer::new(CpuBackend::from_config(&config), config).unwrap();
    hiz.sync(extent).unwrap();
    hiz.set_source(depth_ramp(extent), None);
    hiz.update().unwrap();

    c.bench_function("hiz_clean_update", |b| {
        b.iter(|| black_box(hiz.update()).unwrap());
    });
}

criterion_group!(benches, bench_full_build, bench_worker_scaling, bench_clean_update);
criterion_main!(benches);
