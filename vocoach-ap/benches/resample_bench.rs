//! Linear resampler benchmark
//!
//! Measures normalization of provider-rate chunks to the 16 kHz pipeline
//! rate, the only resampling on the hot path.
//!
//! ## Scenarios
//!
//! - 24000 Hz → 16000 Hz (typical speech synthesis output)
//! - 44100 Hz → 16000 Hz
//! - 48000 Hz → 16000 Hz
//! - 16000 Hz → 48000 Hz (device rate conversion in `create_buffer`)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vocoach_ap::audio::converter::{pcm16_bytes, resample, to_pcm16};
use vocoach_ap::SampleConverter;

fn tone(rate: u32, ms: u32) -> Vec<f32> {
    let len = (rate as u64 * ms as u64 / 1000) as usize;
    (0..len)
        .map(|i| (std::f32::consts::TAU * 220.0 * i as f32 / rate as f32).sin() * 0.5)
        .collect()
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_100ms");

    for (from, to) in [(24_000, 16_000), (44_100, 16_000), (48_000, 16_000), (16_000, 48_000)] {
        let input = tone(from, 100);
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}->{}", from, to)),
            &input,
            |b, input| b.iter(|| black_box(resample(black_box(input), from, to))),
        );
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let converter = SampleConverter::default();
    let payload = pcm16_bytes(&to_pcm16(&tone(24_000, 100)));

    c.bench_function("normalize_24k_chunk", |b| {
        b.iter(|| black_box(converter.normalize(black_box(&payload), 24_000, 16_000)))
    });
}

criterion_group!(benches, bench_resample, bench_normalize);
criterion_main!(benches);
