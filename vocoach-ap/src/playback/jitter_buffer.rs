//! Jitter buffer: pre-buffering, admission control and underrun policy
//!
//! Wraps a [`CircularBuffer`] with a small state machine:
//!
//! ```text
//! Idle → Buffering → Ready → Playing ⇄ Underrun
//!                                  ↘ Error
//! ```
//!
//! Playback may start once the buffered duration reaches the threshold and
//! at least one sample is present. A short read while playing is an
//! underrun, handled per [`UnderrunStrategy`]. The buffer then stays in
//! `Underrun`, returning nothing, until it refills to the threshold and
//! becomes `Ready` again.

use crate::config::{EngineConfig, UnderrunStrategy};
use crate::playback::circular_buffer::CircularBuffer;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Jitter buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterState {
    /// Nothing written since creation or reset
    Idle,
    /// Accumulating toward the threshold
    Buffering,
    /// Threshold reached, waiting for the consumer to start
    Ready,
    /// Consumer is reading
    Playing,
    /// A read came up short while playing
    Underrun,
    Error,
}

impl std::fmt::Display for JitterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JitterState::Idle => write!(f, "Idle"),
            JitterState::Buffering => write!(f, "Buffering"),
            JitterState::Ready => write!(f, "Ready"),
            JitterState::Playing => write!(f, "Playing"),
            JitterState::Underrun => write!(f, "Underrun"),
            JitterState::Error => write!(f, "Error"),
        }
    }
}

/// Jitter buffer tuning, derived from `EngineConfig`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterConfig {
    pub sample_rate: u32,
    pub threshold_ms: f64,
    pub capacity_seconds: f64,
    pub max_buffered_ms: f64,
    pub min_chunk_samples: usize,
    pub strategy: UnderrunStrategy,
}

impl From<&EngineConfig> for JitterConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            threshold_ms: config.pre_buffer_threshold_ms,
            capacity_seconds: config.max_buffer_seconds,
            max_buffered_ms: config.max_buffered_ms,
            min_chunk_samples: config.min_chunk_samples,
            strategy: config.underrun_strategy,
        }
    }
}

/// Result of offering a chunk to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted { overwritten: usize },
    /// Shorter than `min_chunk_samples`
    RejectedTooShort,
    /// Buffered duration already at the hard cap
    RejectedFull,
}

impl AddOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AddOutcome::Accepted { .. })
    }
}

/// One read for the output device
#[derive(Debug, Clone, PartialEq)]
pub struct NextChunk {
    /// Samples to play (may include padding)
    pub data: Vec<f32>,
    /// Real samples taken from the buffer
    pub samples_read: usize,
    /// The read was short
    pub underrun: bool,
    /// This read started a new underrun episode
    pub new_underrun: bool,
}

/// Buffer health report
#[derive(Debug, Clone, PartialEq)]
pub struct BufferHealth {
    pub state: JitterState,
    pub current_ms: f64,
    pub threshold_ms: f64,
    /// `current_ms` as a percentage of the threshold (100 when the threshold is 0)
    pub percent: f64,
    pub available_samples: usize,
    pub dropped_chunks: u64,
    pub underrun_count: u64,
    pub overflow_samples: u64,
    pub last_underrun: Option<Instant>,
}

pub struct JitterBuffer {
    config: JitterConfig,
    buffer: CircularBuffer,
    state: JitterState,
    /// Last full read, tiled by the Repeat strategy
    last_chunk: Vec<f32>,
    dropped_chunks: u64,
    underrun_count: u64,
    last_underrun: Option<Instant>,
}

impl JitterBuffer {
    pub fn new(config: JitterConfig) -> Self {
        debug!(
            "Creating jitter buffer: threshold={}ms, capacity={}s, cap={}ms, strategy={}",
            config.threshold_ms, config.capacity_seconds, config.max_buffered_ms, config.strategy
        );
        Self {
            buffer: CircularBuffer::with_duration(config.capacity_seconds, config.sample_rate),
            config,
            state: JitterState::Idle,
            last_chunk: Vec::new(),
            dropped_chunks: 0,
            underrun_count: 0,
            last_underrun: None,
        }
    }

    /// Offer normalized samples to the buffer.
    ///
    /// Rejections are counted in `dropped_chunks` and never fail the session.
    pub fn add_chunk(&mut self, samples: &[f32]) -> AddOutcome {
        if samples.len() < self.config.min_chunk_samples {
            self.dropped_chunks += 1;
            trace!(
                "Rejected chunk of {} samples (min {})",
                samples.len(),
                self.config.min_chunk_samples
            );
            return AddOutcome::RejectedTooShort;
        }
        if self.buffer.duration_ms() >= self.config.max_buffered_ms {
            self.dropped_chunks += 1;
            warn!(
                "Jitter buffer at cap ({:.0}ms >= {:.0}ms), dropping chunk",
                self.buffer.duration_ms(),
                self.config.max_buffered_ms
            );
            return AddOutcome::RejectedFull;
        }

        let overwritten = self.buffer.write(samples);
        if overwritten > 0 {
            warn!("Jitter buffer overflow: {} samples overwritten", overwritten);
        }

        match self.state {
            JitterState::Idle => {
                self.state = JitterState::Buffering;
                self.check_ready();
            }
            JitterState::Buffering | JitterState::Underrun => self.check_ready(),
            _ => {}
        }

        AddOutcome::Accepted { overwritten }
    }

    fn check_ready(&mut self) {
        if self.can_start_playback() {
            debug!(
                "Jitter buffer ready: {:.0}ms buffered (threshold {}ms)",
                self.buffer.duration_ms(),
                self.config.threshold_ms
            );
            self.state = JitterState::Ready;
        }
    }

    /// Enough audio to start (or restart after an underrun)
    pub fn can_start_playback(&self) -> bool {
        self.buffer.available() > 0 && self.buffer.duration_ms() >= self.config.threshold_ms
    }

    /// Mark playback as started; the caller decides when (threshold or force-start)
    pub fn mark_playing(&mut self) {
        if self.state != JitterState::Error {
            self.state = JitterState::Playing;
        }
    }

    /// Read `count` samples for playback, applying the underrun strategy on
    /// the short read that starts an underrun.
    ///
    /// Until the buffer is back at the threshold, reads inside the underrun
    /// return no data for every strategy. A trickling upstream therefore
    /// re-buffers instead of playing fragments split by padding.
    pub fn get_next_chunk(&mut self, count: usize) -> NextChunk {
        match self.state {
            JitterState::Ready => self.state = JitterState::Playing,
            JitterState::Underrun => {
                return NextChunk {
                    data: Vec::new(),
                    samples_read: 0,
                    underrun: true,
                    new_underrun: false,
                }
            }
            _ => {}
        }

        let result = self.buffer.read(count);
        if !result.partial {
            self.last_chunk.clone_from(&result.data);
            return NextChunk {
                data: result.data,
                samples_read: result.samples_read,
                underrun: false,
                new_underrun: false,
            };
        }

        self.underrun_count += 1;
        self.last_underrun = Some(Instant::now());
        self.state = JitterState::Underrun;
        warn!(
            "Jitter buffer underrun #{}: wanted {} samples, had {}",
            self.underrun_count, count, result.samples_read
        );

        let mut data = result.data;
        match self.config.strategy {
            UnderrunStrategy::Pause => {}
            UnderrunStrategy::Silence => data.resize(count, 0.0),
            UnderrunStrategy::Repeat => self.fill_repeat(&mut data, count),
        }

        NextChunk {
            data,
            samples_read: result.samples_read,
            underrun: true,
            new_underrun: true,
        }
    }

    fn fill_repeat(&self, data: &mut Vec<f32>, count: usize) {
        if self.last_chunk.is_empty() {
            data.resize(count, 0.0);
            return;
        }
        let mut source = self.last_chunk.iter().cycle();
        while data.len() < count {
            if let Some(sample) = source.next() {
                data.push(*sample);
            }
        }
    }

    /// Read up to `count` samples with no underrun handling.
    ///
    /// Used for the tail once upstream has ended.
    pub fn drain_tail(&mut self, count: usize) -> Vec<f32> {
        self.buffer.read(count).data
    }

    pub fn available(&self) -> usize {
        self.buffer.available()
    }

    pub fn duration_ms(&self) -> f64 {
        self.buffer.duration_ms()
    }

    pub fn state(&self) -> JitterState {
        self.state
    }

    pub fn strategy(&self) -> UnderrunStrategy {
        self.config.strategy
    }

    /// In an underrun, waiting to refill to the threshold
    pub fn awaiting_refill(&self) -> bool {
        self.state == JitterState::Underrun
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count
    }

    pub fn set_error(&mut self) {
        self.state = JitterState::Error;
    }

    pub fn health(&self) -> BufferHealth {
        let current_ms = self.buffer.duration_ms();
        let percent = if self.config.threshold_ms > 0.0 {
            current_ms / self.config.threshold_ms * 100.0
        } else {
            100.0
        };

        BufferHealth {
            state: self.state,
            current_ms,
            threshold_ms: self.config.threshold_ms,
            percent,
            available_samples: self.buffer.available(),
            dropped_chunks: self.dropped_chunks,
            underrun_count: self.underrun_count,
            overflow_samples: self.buffer.overflow_samples(),
            last_underrun: self.last_underrun,
        }
    }

    /// Clear samples, counters and state for the next session
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = JitterState::Idle;
        self.last_chunk.clear();
        self.dropped_chunks = 0;
        self.underrun_count = 0;
        self.last_underrun = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: UnderrunStrategy) -> JitterConfig {
        JitterConfig {
            sample_rate: 16_000,
            threshold_ms: 150.0,
            capacity_seconds: 2.0,
            max_buffered_ms: 1000.0,
            min_chunk_samples: 32,
            strategy,
        }
    }

    #[test]
    fn test_ready_at_threshold() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Silence));
        assert_eq!(jitter.state(), JitterState::Idle);

        jitter.add_chunk(&vec![0.1; 1600]);
        assert_eq!(jitter.state(), JitterState::Buffering);
        assert!(!jitter.can_start_playback());

        jitter.add_chunk(&vec![0.1; 800]);
        assert_eq!(jitter.state(), JitterState::Ready);
        assert!(jitter.can_start_playback());
    }

    #[test]
    fn test_zero_threshold_needs_a_sample() {
        let mut jitter = JitterBuffer::new(JitterConfig {
            threshold_ms: 0.0,
            ..config(UnderrunStrategy::Silence)
        });
        assert!(!jitter.can_start_playback());
        jitter.add_chunk(&vec![0.0; 64]);
        assert!(jitter.can_start_playback());
    }

    #[test]
    fn test_admission_rejects_short_and_full() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Silence));
        assert_eq!(jitter.add_chunk(&[0.0; 8]), AddOutcome::RejectedTooShort);

        jitter.add_chunk(&vec![0.0; 16_000]);
        assert_eq!(jitter.add_chunk(&vec![0.0; 320]), AddOutcome::RejectedFull);
        assert_eq!(jitter.dropped_chunks(), 2);
    }

    #[test]
    fn test_silence_pads_short_read() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Silence));
        jitter.add_chunk(&vec![0.5; 2400]);
        jitter.mark_playing();

        let next = jitter.get_next_chunk(2048);
        assert!(!next.underrun);

        let next = jitter.get_next_chunk(2048);
        assert!(next.underrun && next.new_underrun);
        assert_eq!(next.samples_read, 352);
        assert_eq!(next.data.len(), 2048);
        assert_eq!(next.data[351], 0.5);
        assert_eq!(next.data[352], 0.0);
        assert_eq!(jitter.underrun_count(), 1);
        assert_eq!(jitter.state(), JitterState::Underrun);
    }

    #[test]
    fn test_pause_returns_partial_only() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Pause));
        jitter.add_chunk(&vec![0.5; 100]);
        jitter.mark_playing();

        let next = jitter.get_next_chunk(2048);
        assert_eq!(next.data.len(), 100);
        assert!(jitter.awaiting_refill());

        jitter.add_chunk(&vec![0.5; 2400]);
        assert_eq!(jitter.state(), JitterState::Ready);
        assert!(!jitter.awaiting_refill());
    }

    #[test]
    fn test_repeat_tiles_last_chunk() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Repeat));
        let pattern: Vec<f32> = (0..4).map(|i| i as f32 * 0.1).collect();
        let mut block = Vec::new();
        for _ in 0..10 {
            block.extend_from_slice(&pattern);
        }
        jitter.add_chunk(&block);
        jitter.mark_playing();

        jitter.get_next_chunk(4);
        let next = jitter.get_next_chunk(40);
        assert_eq!(next.samples_read, 36);
        assert_eq!(next.data.len(), 40);
        assert_eq!(&next.data[36..], &pattern[..]);
    }

    #[test]
    fn test_repeated_empty_reads_stop_padding() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Silence));
        jitter.add_chunk(&vec![0.5; 64]);
        jitter.mark_playing();

        assert_eq!(jitter.get_next_chunk(128).data.len(), 128);
        let next = jitter.get_next_chunk(128);
        assert!(next.underrun && !next.new_underrun);
        assert!(next.data.is_empty());
        assert_eq!(jitter.underrun_count(), 1);
    }

    #[test]
    fn test_underrun_waits_for_threshold_before_playing() {
        let mut jitter = JitterBuffer::new(JitterConfig {
            threshold_ms: 300.0,
            ..config(UnderrunStrategy::Silence)
        });
        jitter.add_chunk(&vec![0.5; 4800]);
        jitter.mark_playing();
        assert!(!jitter.get_next_chunk(4800).underrun);
        assert!(jitter.get_next_chunk(2048).new_underrun);

        // 128ms against a 300ms threshold
        jitter.add_chunk(&vec![0.5; 2048]);
        let next = jitter.get_next_chunk(2048);
        assert!(next.data.is_empty());
        assert_eq!(next.samples_read, 0);
        assert_eq!(jitter.state(), JitterState::Underrun);
        assert_eq!(jitter.available(), 2048);
        assert!(jitter.awaiting_refill());

        jitter.add_chunk(&vec![0.5; 2752]);
        assert_eq!(jitter.state(), JitterState::Ready);
        let next = jitter.get_next_chunk(2048);
        assert!(!next.underrun);
        assert_eq!(next.data.len(), 2048);
        assert_eq!(jitter.state(), JitterState::Playing);
        assert_eq!(jitter.underrun_count(), 1);
    }

    #[test]
    fn test_drain_tail_ignores_underrun() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Silence));
        jitter.add_chunk(&vec![0.5; 64]);
        jitter.mark_playing();
        jitter.get_next_chunk(128);
        jitter.add_chunk(&vec![0.5; 100]);

        assert_eq!(jitter.drain_tail(128).len(), 100);
        assert_eq!(jitter.available(), 0);
    }

    #[test]
    fn test_health_and_reset() {
        let mut jitter = JitterBuffer::new(config(UnderrunStrategy::Silence));
        jitter.add_chunk(&vec![0.0; 1200]);
        let health = jitter.health();
        assert_eq!(health.current_ms, 75.0);
        assert_eq!(health.percent, 50.0);

        jitter.reset();
        assert_eq!(jitter.state(), JitterState::Idle);
        assert_eq!(jitter.available(), 0);
        assert_eq!(jitter.health().dropped_chunks, 0);
    }
}
