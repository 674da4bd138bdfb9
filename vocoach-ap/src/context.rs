//! Application-owned audio context
//!
//! One output device shared by every player in the process. The device is
//! opened lazily on first use and reopened whenever the current one has been
//! marked invalid (stream error, device unplugged).

use crate::audio::AudioOutput;
use crate::config::OutputConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AudioContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: OutputConfig,
    sample_rate: u32,
    gain: f32,
    output: Mutex<Option<Arc<AudioOutput>>>,
}

impl AudioContext {
    /// # Arguments
    /// - `config`: output device selection
    /// - `sample_rate`: rate requested from the device (pipeline rate)
    /// - `gain`: gain applied to each newly opened device
    pub fn new(config: OutputConfig, sample_rate: u32, gain: f32) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config,
                sample_rate,
                gain,
                output: Mutex::new(None),
            }),
        }
    }

    /// Context backed by the clock-only null device
    pub fn null(sample_rate: u32) -> Self {
        Self::new(
            OutputConfig {
                null_device: true,
                ..Default::default()
            },
            sample_rate,
            1.0,
        )
    }

    /// Current output, opening or reopening the device as needed
    pub async fn output(&self) -> Result<Arc<AudioOutput>> {
        let mut slot = self.inner.output.lock().await;

        if let Some(output) = slot.as_ref() {
            if output.is_valid() {
                return Ok(Arc::clone(output));
            }
            warn!(
                "Audio output '{}' invalid after {} errors, reopening",
                output.device_name(),
                output.error_count()
            );
        }

        let config = self.inner.config.clone();
        let sample_rate = self.inner.sample_rate;
        let gain = self.inner.gain;
        let output = if config.null_device {
            AudioOutput::open(&config, sample_rate, gain)?
        } else {
            tokio::task::spawn_blocking(move || AudioOutput::open(&config, sample_rate, gain))
                .await
                .map_err(|e| Error::AudioOutput(format!("Device open task failed: {}", e)))??
        };

        let output = Arc::new(output);
        info!("Audio context using output '{}'", output.device_name());
        *slot = Some(Arc::clone(&output));
        Ok(output)
    }

    /// Output currently held, without opening one
    pub async fn current(&self) -> Option<Arc<AudioOutput>> {
        self.inner.output.lock().await.clone()
    }

    /// Drop the held output; the next `output()` call opens a fresh one
    pub async fn close(&self) {
        if self.inner.output.lock().await.take().is_some() {
            info!("Audio context closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_output_is_reused_while_valid() {
        let context = AudioContext::null(16_000);
        let a = context.output().await.unwrap();
        let b = context.output().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_output_is_replaced() {
        let context = AudioContext::null(16_000);
        let first = context.output().await.unwrap();
        first.invalidate();

        let second = context.output().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_output() {
        let context = AudioContext::null(16_000);
        context.output().await.unwrap();
        context.close().await;
        assert!(context.current().await.is_none());
    }
}
