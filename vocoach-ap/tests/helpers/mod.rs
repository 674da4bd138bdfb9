//! Shared fixtures for streaming player integration tests
//!
//! Synthesized PCM16 speech stand-ins, a fast engine configuration and a
//! player wired to the clock-only null device.

#![allow(dead_code)]

use std::f32::consts::TAU;
use std::sync::Arc;

use vocoach_ap::audio::converter::{pcm16_bytes, to_pcm16};
use vocoach_ap::{
    AudioContext, DoneReason, EngineConfig, MemoryProvider, PlayerEvent, StreamingPlayer, Subscription,
};

/// Rate the test providers "synthesize" at
pub const NATIVE_RATE: u32 = 24_000;

/// Samples in one 100 ms chunk at `NATIVE_RATE`
pub const CHUNK_100MS: usize = 2_400;

/// Continuous 220 Hz sine split into `count` PCM16 chunks of `samples_per_chunk`
pub fn sine_chunks(count: usize, samples_per_chunk: usize) -> Vec<Vec<u8>> {
    let total = count * samples_per_chunk;
    let samples: Vec<f32> = (0..total)
        .map(|i| 0.5 * (TAU * 220.0 * i as f32 / NATIVE_RATE as f32).sin())
        .collect();
    samples
        .chunks(samples_per_chunk)
        .map(|chunk| pcm16_bytes(&to_pcm16(chunk)))
        .collect()
}

/// `count` chunks of 100 ms each
pub fn speech_chunks(count: usize) -> Vec<Vec<u8>> {
    sine_chunks(count, CHUNK_100MS)
}

/// Defaults with room for every event a test session emits
pub fn test_config() -> EngineConfig {
    EngineConfig {
        event_capacity: 4096,
        ..EngineConfig::default()
    }
}

pub fn null_player(provider: MemoryProvider, config: EngineConfig) -> StreamingPlayer {
    let context = AudioContext::null(config.sample_rate);
    StreamingPlayer::new(Arc::new(provider), context, config).unwrap()
}

/// Everything already delivered to `subscription`
pub fn drain(subscription: &mut Subscription) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

pub fn done_reasons(events: &[PlayerEvent]) -> Vec<DoneReason> {
    events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::Done { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

pub fn count_named(events: &[PlayerEvent], name: &str) -> usize {
    events.iter().filter(|event| event.name() == name).count()
}
