//! Buffering stage throughput benchmark
//!
//! Measures the per-tick work of the streaming pipeline: ring buffer
//! write/read, jitter buffer admission and PCM16 decode.
//!
//! **Goal:** one processing tick (50 ms of audio) costs microseconds

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vocoach_ap::audio::converter::{pcm16_bytes, to_pcm16};
use vocoach_ap::playback::JitterConfig;
use vocoach_ap::{CircularBuffer, EngineConfig, JitterBuffer, SampleConverter};

fn bench_circular_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("circular_buffer");

    for chunk in [256usize, 2048, 8192] {
        let data = vec![0.25f32; chunk];
        group.throughput(Throughput::Elements(chunk as u64));

        group.bench_with_input(BenchmarkId::new("write_read", chunk), &data, |b, data| {
            let mut ring = CircularBuffer::with_duration(5.0, 16_000);
            b.iter(|| {
                ring.write(black_box(data));
                black_box(ring.read(data.len()));
            });
        });
    }

    group.bench_function("write_overflowing", |b| {
        let mut ring = CircularBuffer::new(4096, 16_000);
        let data = vec![0.5f32; 3000];
        b.iter(|| black_box(ring.write(black_box(&data))));
    });

    group.finish();
}

fn bench_jitter_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("jitter_buffer");
    let config = JitterConfig::from(&EngineConfig::default());
    // 100 ms at 16 kHz
    let chunk = vec![0.1f32; 1600];

    group.bench_function("add_then_play_100ms", |b| {
        let mut buffer = JitterBuffer::new(config);
        buffer.mark_playing();
        b.iter(|| {
            buffer.add_chunk(black_box(&chunk));
            black_box(buffer.get_next_chunk(1600));
        });
    });

    group.bench_function("underrun_padding", |b| {
        let mut buffer = JitterBuffer::new(config);
        buffer.mark_playing();
        b.iter(|| {
            buffer.add_chunk(black_box(&chunk[..800]));
            black_box(buffer.get_next_chunk(2048));
        });
    });

    group.finish();
}

fn bench_pcm16_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm16_decode");
    let converter = SampleConverter::default();

    for samples in [2400usize, 24_000] {
        let signal: Vec<f32> = (0..samples).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let payload = pcm16_bytes(&to_pcm16(&signal));
        group.throughput(Throughput::Elements(samples as u64));

        group.bench_with_input(BenchmarkId::new("convert", samples), &payload, |b, payload| {
            b.iter(|| black_box(converter.convert(black_box(payload), 24_000)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_circular_buffer, bench_jitter_buffer, bench_pcm16_decode);
criterion_main!(benches);
