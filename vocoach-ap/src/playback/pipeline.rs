//! Per-player processing pipeline
//!
//! Groups the FIFO queue, converter, aligner and jitter buffer. A player
//! creates one pipeline and resets it between sessions; a running session
//! owns it outright and hands it back when it ends.

use crate::audio::{AudioChunk, SampleConverter};
use crate::config::EngineConfig;
use crate::playback::fifo_queue::FifoQueue;
use crate::playback::jitter_buffer::{JitterBuffer, JitterConfig, JitterState};
use crate::playback::zero_crossing::ZeroCrossingAligner;

/// Occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineStats {
    pub fifo_len: usize,
    pub fifo_bytes: usize,
    pub fifo_dropped: u64,
    pub jitter_samples: usize,
    pub jitter_ms: f64,
    pub jitter_state: JitterState,
}

pub struct Pipeline {
    pub(crate) fifo: FifoQueue<AudioChunk>,
    pub(crate) converter: SampleConverter,
    pub(crate) aligner: ZeroCrossingAligner,
    pub(crate) jitter: JitterBuffer,
}

impl Pipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fifo: FifoQueue::new(config.fifo_max_size, config.fifo_max_bytes),
            converter: SampleConverter::new(config.clamp_samples),
            aligner: ZeroCrossingAligner::new(config.zero_crossing, config.sample_rate),
            jitter: JitterBuffer::new(JitterConfig::from(config)),
        }
    }

    /// Clear all buffered audio and counters
    pub fn reset(&mut self) {
        self.fifo.clear();
        self.jitter.reset();
    }

    /// FIFO and jitter buffer both empty
    pub fn is_drained(&self) -> bool {
        self.fifo.is_empty() && self.jitter.available() == 0
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            fifo_len: self.fifo.len(),
            fifo_bytes: self.fifo.bytes(),
            fifo_dropped: self.fifo.dropped(),
            jitter_samples: self.jitter.available(),
            jitter_ms: self.jitter.duration_ms(),
            jitter_state: self.jitter.state(),
        }
    }
}
