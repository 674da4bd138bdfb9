//! Core audio data types
//!
//! Defines the inbound chunk, the normalized sample block produced by the
//! converter, and the device-ready buffer handed to `AudioOutput`.

use std::sync::Arc;
use tokio::time::Instant;
use vocoach_common::time::samples_to_ms;

/// One inbound unit of raw PCM16 audio as delivered by upstream.
///
/// **Format:** little-endian signed 16-bit mono at the provider's native rate.
/// Immutable once created; the payload is shared, never copied.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw PCM16 bytes
    pub payload: Arc<[u8]>,
    /// Arrival time (monotonic)
    pub received_at: Instant,
    /// Arrival order within the session, starting at 0
    pub sequence: u64,
}

impl AudioChunk {
    pub fn new(payload: Vec<u8>, sequence: u64) -> Self {
        Self {
            payload: payload.into(),
            received_at: Instant::now(),
            sequence,
        }
    }

    /// Payload size in bytes
    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

/// Normalized mono f32 samples plus their duration at the pipeline rate
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedAudio {
    pub data: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: f64,
}

impl ConvertedAudio {
    pub fn new(data: Vec<f32>, sample_rate: u32) -> Self {
        let duration_ms = samples_to_ms(data.len(), sample_rate);
        Self {
            data,
            sample_rate,
            duration_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A block of mono samples ready to be scheduled on the output device.
///
/// Created through `AudioOutput::create_buffer`; samples are shared so the
/// render callback and the history never copy them.
#[derive(Debug, Clone)]
pub struct PlayableBuffer {
    pub(crate) samples: Arc<[f32]>,
    pub(crate) sample_rate: u32,
}

impl PlayableBuffer {
    pub(crate) fn new(samples: Arc<[f32]>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of mono frames
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Exact duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunk_size_and_sequence() {
        let chunk = AudioChunk::new(vec![0u8; 640], 3);
        assert_eq!(chunk.size_bytes(), 640);
        assert_eq!(chunk.sequence, 3);
    }

    #[test]
    fn test_converted_duration() {
        let audio = ConvertedAudio::new(vec![0.0; 2400], 16_000);
        assert_eq!(audio.duration_ms, 150.0);
        assert_eq!(audio.len(), 2400);
    }

    #[test]
    fn test_playable_buffer_duration() {
        let buffer = PlayableBuffer::new(vec![0.0f32; 2048].into(), 16_000);
        assert!((buffer.duration_secs() - 0.128).abs() < 1e-12);
    }
}
