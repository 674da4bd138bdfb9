//! Zero-crossing alignment for click-free chunk boundaries
//!
//! Trims a sample block so it starts (and/or ends) at or near a zero
//! crossing. The search is confined to a short window at each edge; when no
//! crossing is found the lowest-amplitude sample in the window is used.
//!
//! Alignment never produces a block larger than its input, and a trim larger
//! than `max_trim_percent` of the block is refused (input returned as-is).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;
use vocoach_common::time::ms_to_samples;

/// Which edges to align
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    Start,
    End,
    Both,
}

impl AlignMode {
    fn aligns_start(self) -> bool {
        matches!(self, AlignMode::Start | AlignMode::Both)
    }

    fn aligns_end(self) -> bool {
        matches!(self, AlignMode::End | AlignMode::Both)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZeroCrossingConfig {
    /// Search window at each edge (ms)
    pub window_ms: f64,
    /// Samples with |x| at or below this count as zero
    pub near_zero_threshold: f32,
    /// Refuse to trim more than this share of the block (percent)
    pub max_trim_percent: f64,
    /// Blocks shorter than this are returned untouched
    pub min_buffer_size: usize,
}

impl Default for ZeroCrossingConfig {
    fn default() -> Self {
        Self {
            window_ms: 20.0,
            near_zero_threshold: 0.01,
            max_trim_percent: 25.0,
            min_buffer_size: 64,
        }
    }
}

impl ZeroCrossingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_ms <= 0.0 {
            return Err(Error::Config("zero_crossing.window_ms must be > 0".to_string()));
        }
        if !(0.0..=100.0).contains(&self.max_trim_percent) {
            return Err(Error::Config(
                "zero_crossing.max_trim_percent outside 0..=100".to_string(),
            ));
        }
        if self.near_zero_threshold < 0.0 {
            return Err(Error::Config(
                "zero_crossing.near_zero_threshold must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of an alignment
#[derive(Debug, Clone, PartialEq)]
pub struct AlignResult {
    pub data: Vec<f32>,
    pub trimmed_start: usize,
    pub trimmed_end: usize,
    /// False when the input was returned unchanged because it was too short
    /// or the trim exceeded the limit
    pub success: bool,
}

impl AlignResult {
    fn unchanged(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
            trimmed_start: 0,
            trimmed_end: 0,
            success: false,
        }
    }
}

pub struct ZeroCrossingAligner {
    config: ZeroCrossingConfig,
    sample_rate: u32,
}

impl ZeroCrossingAligner {
    pub fn new(config: ZeroCrossingConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
        }
    }

    pub fn align(&self, data: &[f32], mode: AlignMode) -> AlignResult {
        if data.len() < self.config.min_buffer_size.max(2) {
            return AlignResult::unchanged(data);
        }

        let window = ms_to_samples(self.config.window_ms, self.sample_rate)
            .clamp(1, data.len());

        let start = if mode.aligns_start() {
            self.find_start(&data[..window])
        } else {
            0
        };
        let end = if mode.aligns_end() {
            let offset = data.len() - window;
            offset + self.find_end(&data[offset..])
        } else {
            data.len()
        };

        if end <= start {
            return AlignResult::unchanged(data);
        }

        let trimmed = start + (data.len() - end);
        let limit = data.len() as f64 * self.config.max_trim_percent / 100.0;
        if trimmed as f64 > limit {
            trace!(
                "Zero-crossing trim of {} samples exceeds {:.0}% of {}, skipping",
                trimmed,
                self.config.max_trim_percent,
                data.len()
            );
            return AlignResult::unchanged(data);
        }

        AlignResult {
            data: data[start..end].to_vec(),
            trimmed_start: start,
            trimmed_end: data.len() - end,
            success: true,
        }
    }

    /// Index of the first near-zero sample or sign change in `window`
    fn find_start(&self, window: &[f32]) -> usize {
        let threshold = self.config.near_zero_threshold;
        for i in 0..window.len() {
            if window[i].abs() <= threshold {
                return i;
            }
            if i + 1 < window.len() && crosses(window[i], window[i + 1]) {
                return if window[i + 1].abs() < window[i].abs() { i + 1 } else { i };
            }
        }
        quietest(window)
    }

    /// Exclusive end index (within `window`) at the last near-zero sample or
    /// sign change
    fn find_end(&self, window: &[f32]) -> usize {
        let threshold = self.config.near_zero_threshold;
        for i in (0..window.len()).rev() {
            if window[i].abs() <= threshold {
                return i + 1;
            }
            if i > 0 && crosses(window[i - 1], window[i]) {
                return if window[i - 1].abs() < window[i].abs() { i } else { i + 1 };
            }
        }
        quietest(window) + 1
    }
}

fn crosses(a: f32, b: f32) -> bool {
    (a < 0.0 && b >= 0.0) || (a >= 0.0 && b < 0.0)
}

fn quietest(window: &[f32]) -> usize {
    window
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligner() -> ZeroCrossingAligner {
        ZeroCrossingAligner::new(ZeroCrossingConfig::default(), 16_000)
    }

    fn sine(len: usize, phase: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (phase + i as f32 * 2.0 * std::f32::consts::PI * 200.0 / 16_000.0).sin() * 0.8)
            .collect()
    }

    #[test]
    fn test_short_buffer_unchanged() {
        let data = vec![0.5; 10];
        let result = aligner().align(&data, AlignMode::Both);
        assert!(!result.success);
        assert_eq!(result.data, data);
    }

    #[test]
    fn test_start_aligned_near_zero() {
        let data = sine(2048, 1.0);
        let result = aligner().align(&data, AlignMode::Start);

        assert!(result.success);
        assert!(result.trimmed_start > 0);
        assert_eq!(result.trimmed_end, 0);
        assert!(result.data[0].abs() < 0.05);
    }

    #[test]
    fn test_end_aligned_near_zero() {
        let data = sine(2000, 0.3);
        let result = aligner().align(&data, AlignMode::End);

        assert!(result.success);
        assert_eq!(result.trimmed_start, 0);
        assert!(result.data.last().unwrap().abs() < 0.05);
    }

    #[test]
    fn test_already_at_zero_trims_nothing() {
        let data = sine(1024, 0.0);
        let result = aligner().align(&data, AlignMode::Start);
        assert!(result.success);
        assert_eq!(result.trimmed_start, 0);
        assert_eq!(result.data.len(), 1024);
    }

    #[test]
    fn test_never_grows_and_respects_trim_limit() {
        for phase in [0.1f32, 0.7, 1.3, 2.9, 4.4] {
            for len in [64usize, 200, 640, 2048] {
                let data = sine(len, phase);
                let result = aligner().align(&data, AlignMode::Both);
                assert!(result.data.len() <= data.len());
                if result.success {
                    let trimmed = result.trimmed_start + result.trimmed_end;
                    assert!(trimmed as f64 <= len as f64 * 0.25);
                    assert_eq!(result.data.len(), len - trimmed);
                } else {
                    assert_eq!(result.data, data);
                }
            }
        }
    }

    #[test]
    fn test_fallback_picks_quietest_sample() {
        // No crossing and nothing under the threshold: all positive
        let mut data = vec![0.5f32; 400];
        data[7] = 0.2;
        let result = aligner().align(&data, AlignMode::Start);
        assert!(result.success);
        assert_eq!(result.trimmed_start, 7);
    }

    #[test]
    fn test_excessive_trim_refused() {
        let mut data = vec![0.5f32; 100];
        data[60] = 0.0;
        let config = ZeroCrossingConfig {
            window_ms: 10.0,
            ..Default::default()
        };
        let result = ZeroCrossingAligner::new(config, 16_000).align(&data, AlignMode::Start);
        assert!(!result.success);
        assert_eq!(result.data.len(), 100);
    }
}
