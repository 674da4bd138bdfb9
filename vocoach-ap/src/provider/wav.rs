//! WAV file provider
//!
//! Streams a 16-bit mono WAV file as PCM16 chunks, paced like a network
//! synthesis service: chunks arrive at `realtime_factor` × playback speed,
//! optionally jittered by a fixed delay pattern.

use super::{ChunkStream, SpeakOptions, SpeechProvider};
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Delay offsets cycled through when jitter is enabled (fraction of one chunk)
const JITTER_PATTERN: [f64; 8] = [0.0, 0.6, -0.3, 1.4, -0.5, 0.2, 2.5, -0.8];

pub struct WavFileProvider {
    path: PathBuf,
    sample_rate: u32,
    samples: Arc<Vec<i16>>,
    chunk_samples: usize,
    realtime_factor: f64,
    jitter: bool,
}

impl WavFileProvider {
    /// Load `path` into memory.
    ///
    /// # Errors
    /// - file missing or not a WAV file
    /// - not mono or not 16-bit integer PCM
    pub fn open(path: impl AsRef<Path>, chunk_ms: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();

        if spec.channels != 1
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(Error::Validation(format!(
                "{} must be 16-bit mono PCM (got {} channels, {} bits, {:?})",
                path.display(),
                spec.channels,
                spec.bits_per_sample,
                spec.sample_format
            )));
        }

        let samples = reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let chunk_samples = ((spec.sample_rate as u64 * chunk_ms.max(1) as u64) / 1000).max(1) as usize;

        info!(
            "Loaded {}: {} samples @ {}Hz ({} samples per chunk)",
            path.display(),
            samples.len(),
            spec.sample_rate,
            chunk_samples
        );

        Ok(Self {
            path,
            sample_rate: spec.sample_rate,
            samples: Arc::new(samples),
            chunk_samples,
            realtime_factor: 0.0,
            jitter: false,
        })
    }

    /// Pace delivery: 1.0 = real time, 2.0 = twice as fast, 0 = no pacing
    pub fn with_realtime_factor(mut self, factor: f64) -> Self {
        self.realtime_factor = factor.max(0.0);
        self
    }

    /// Vary inter-chunk delays to mimic network jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    fn chunk_delay(&self, index: usize) -> Duration {
        if self.realtime_factor <= 0.0 {
            return Duration::ZERO;
        }
        let base = self.chunk_samples as f64 / self.sample_rate as f64 / self.realtime_factor;
        let offset = if self.jitter {
            JITTER_PATTERN[index % JITTER_PATTERN.len()]
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + offset)).max(0.0))
    }
}

impl SpeechProvider for WavFileProvider {
    fn name(&self) -> &str {
        "wav"
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open_stream(&self, _text: &str, _options: &SpeakOptions) -> BoxFuture<'static, Result<ChunkStream>> {
        let samples = Arc::clone(&self.samples);
        let chunk_samples = self.chunk_samples;
        let delays: Vec<Duration> = (0..samples.len().div_ceil(chunk_samples))
            .map(|i| self.chunk_delay(i))
            .collect();
        debug!("Streaming {} chunks from {}", delays.len(), self.path.display());

        Box::pin(async move {
            let stream = async_stream::stream! {
                for (chunk, delay) in samples.chunks(chunk_samples).zip(delays) {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let bytes: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
                    yield Ok(bytes);
                }
            };
            Ok(stream.boxed())
        })
    }
}
