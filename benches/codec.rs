//! Pack/unpack throughput on a synthetic tomogram
//!
//! Run with: cargo bench --bench codec

use criterion::{criterion_group, criterion_main, Criterion};
use jpgstack::{pack, unpack, CodecConfig, Volume};
use ndarray::Array3;
use std::hint::black_box;

fn tomogram() -> Volume {
    Volume::from(Array3::from_shape_fn((16, 256, 256), |(z, y, x)| {
        ((x as f32 * 0.07).sin() + (y as f32 * 0.05).cos()) * (1.0 + z as f32 * 0.01)
    }))
}

fn bench_codec(c: &mut Criterion) {
    let volume = tomogram();
    let config = CodecConfig::new();
    let container = pack(&volume, &config).expect("pack failed");

    c.bench_function("pack 16x256x256 f32", |b| {
        b.iter(|| pack(black_box(&volume), &config).expect("pack failed"))
    });

    c.bench_function("unpack 16x256x256 f32", |b| {
        b.iter(|| unpack(black_box(&container), &config).expect("unpack failed"))
    });

    let single = CodecConfig::new().with_cores(1);
    c.bench_function("pack 16x256x256 f32 single core", |b| {
        b.iter(|| pack(black_box(&volume), &single).expect("pack failed"))
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
