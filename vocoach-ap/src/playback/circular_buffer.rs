/// Fixed-capacity sample ring with overwrite-on-full
///
/// Backs the jitter buffer. Unlike the device ring in `AudioOutput`, this ring
/// is owned by a single session task, so it is used unsplit.
///
/// Design:
/// - Writes never block: when full, the oldest samples are overwritten and
///   counted as overflow
/// - Reads never block: a short read returns what is there and is flagged
///   `partial`
/// - Buffered duration is derived from the occupied length in O(1)

use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};
use vocoach_common::time::samples_to_ms;

/// Result of one read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub data: Vec<f32>,
    pub samples_read: usize,
    /// Fewer samples than requested were available
    pub partial: bool,
}

/// Ring buffer of normalized f32 samples
pub struct CircularBuffer {
    ring: HeapRb<f32>,
    sample_rate: u32,
    /// Samples lost to overwrite since creation or last reset
    overflow_samples: u64,
}

impl CircularBuffer {
    /// Create a buffer holding `capacity` samples
    ///
    /// # Arguments
    /// * `capacity` - Size in samples (minimum 1)
    /// * `sample_rate` - Rate used for duration reporting
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        let capacity = capacity.max(1);
        debug!(
            "Creating circular buffer: {} samples ({:.0}ms @ {}Hz)",
            capacity,
            samples_to_ms(capacity, sample_rate),
            sample_rate
        );

        Self {
            ring: HeapRb::new(capacity),
            sample_rate,
            overflow_samples: 0,
        }
    }

    /// Create a buffer sized for `seconds` of audio
    pub fn with_duration(seconds: f64, sample_rate: u32) -> Self {
        let capacity = (seconds * sample_rate as f64).ceil() as usize;
        Self::new(capacity, sample_rate)
    }

    /// Append samples, overwriting the oldest when full.
    ///
    /// Returns the number of samples overwritten (including leading input
    /// samples when the input alone exceeds capacity).
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let capacity = self.capacity();
        let (input, truncated) = if samples.len() > capacity {
            (&samples[samples.len() - capacity..], samples.len() - capacity)
        } else {
            (samples, 0)
        };

        let evicted = (self.ring.occupied_len() + input.len()).saturating_sub(capacity);
        if evicted > 0 {
            self.ring.skip(evicted);
        }
        self.ring.push_slice(input);

        let overwritten = evicted + truncated;
        if overwritten > 0 {
            self.overflow_samples += overwritten as u64;
            trace!("Circular buffer overflow: {} samples overwritten", overwritten);
        }
        overwritten
    }

    /// Consume up to `count` samples in FIFO order
    pub fn read(&mut self, count: usize) -> ReadResult {
        let take = count.min(self.ring.occupied_len());
        let mut data = vec![0.0f32; take];
        let samples_read = self.ring.pop_slice(&mut data);
        data.truncate(samples_read);

        ReadResult {
            data,
            samples_read,
            partial: samples_read < count,
        }
    }

    /// Samples available to read
    pub fn available(&self) -> usize {
        self.ring.occupied_len()
    }

    /// Free space in samples
    pub fn vacant(&self) -> usize {
        self.ring.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().into()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Buffered audio in milliseconds
    pub fn duration_ms(&self) -> f64 {
        samples_to_ms(self.available(), self.sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn overflow_samples(&self) -> u64 {
        self.overflow_samples
    }

    /// Drop all buffered samples and zero the overflow counter
    pub fn clear(&mut self) {
        self.ring.clear();
        self.overflow_samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_write_then_read_in_order() {
        let mut buffer = CircularBuffer::new(8, 16_000);
        assert_eq!(buffer.write(&ramp(0, 5)), 0);

        let result = buffer.read(3);
        assert_eq!(result.data, vec![0.0, 1.0, 2.0]);
        assert!(!result.partial);
        assert_eq!(buffer.available(), 2);
    }

    #[test]
    fn test_partial_read() {
        let mut buffer = CircularBuffer::new(8, 16_000);
        buffer.write(&ramp(0, 2));

        let result = buffer.read(5);
        assert_eq!(result.samples_read, 2);
        assert!(result.partial);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_overwrites_oldest() {
        let mut buffer = CircularBuffer::new(4, 16_000);
        buffer.write(&ramp(0, 3));
        assert_eq!(buffer.write(&ramp(3, 3)), 2);

        assert_eq!(buffer.available(), 4);
        assert_eq!(buffer.overflow_samples(), 2);
        assert_eq!(buffer.read(4).data, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut buffer = CircularBuffer::new(4, 16_000);
        buffer.write(&ramp(0, 1));
        assert_eq!(buffer.write(&ramp(10, 6)), 3);
        assert_eq!(buffer.read(4).data, vec![12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn test_duration_tracks_occupancy() {
        let mut buffer = CircularBuffer::with_duration(1.0, 16_000);
        assert_eq!(buffer.capacity(), 16_000);
        buffer.write(&vec![0.0; 4800]);
        assert_eq!(buffer.duration_ms(), 300.0);
    }

    #[test]
    fn test_clear_resets() {
        let mut buffer = CircularBuffer::new(4, 16_000);
        buffer.write(&ramp(0, 6));
        buffer.clear();
        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.overflow_samples(), 0);
    }

    #[test]
    fn test_available_never_exceeds_capacity() {
        let mut buffer = CircularBuffer::new(37, 16_000);
        let mut seed = 17usize;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345) % 65_536;
            if seed % 3 == 0 {
                buffer.read(seed % 50);
            } else {
                buffer.write(&vec![0.5; seed % 60]);
            }
            assert!(buffer.available() <= buffer.capacity());
            assert_eq!(buffer.available() + buffer.vacant(), buffer.capacity());
        }
    }
}
