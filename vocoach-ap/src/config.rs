//! Configuration for the vocoach-ap playback engine
//!
//! Configuration is loaded once at startup from an optional TOML file (see
//! `vocoach_common::config` for the lookup order). Every field has a built-in
//! default, so an empty or missing file yields a working engine.
//!
//! ```toml
//! [engine]
//! sample_rate = 16000
//! pre_buffer_threshold_ms = 300
//! underrun_strategy = "silence"
//!
//! [engine.aggressive_fill]
//! target_ms = 1500
//! max_chunks_per_tick = 16
//!
//! [output]
//! null_device = false
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::playback::zero_crossing::ZeroCrossingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Complete configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Streaming pipeline tuning
    pub engine: EngineConfig,
    /// Output device selection
    pub output: OutputConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Resolve, load and validate configuration
    ///
    /// # Arguments
    ///
    /// * `cli_path` - Explicit `--config` path (highest priority)
    /// * `env_var` - Environment variable consulted when no CLI path is given
    pub fn load(cli_path: Option<&Path>, env_var: &str) -> Result<Self> {
        let config: AppConfig = vocoach_common::config::load_or_default(cli_path, env_var)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.output.validate()
    }
}

/// What the jitter buffer returns when a read comes up short
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnderrunStrategy {
    /// Return only the samples available; scheduling waits for a refill
    Pause,
    /// Pad the read with zeros
    #[default]
    Silence,
    /// Pad the read by tiling the last full chunk
    Repeat,
}

impl std::fmt::Display for UnderrunStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnderrunStrategy::Pause => write!(f, "pause"),
            UnderrunStrategy::Silence => write!(f, "silence"),
            UnderrunStrategy::Repeat => write!(f, "repeat"),
        }
    }
}

impl std::str::FromStr for UnderrunStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pause" => Ok(UnderrunStrategy::Pause),
            "silence" => Ok(UnderrunStrategy::Silence),
            "repeat" => Ok(UnderrunStrategy::Repeat),
            other => Err(Error::Config(format!("Unknown underrun strategy: {}", other))),
        }
    }
}

/// How hard one processing tick fills the jitter buffer from the FIFO
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FillPolicy {
    /// Stop draining the FIFO once the jitter buffer holds this much audio
    pub target_ms: f64,
    /// Upper bound on chunks moved per tick
    pub max_chunks_per_tick: usize,
}

/// Streaming pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Pipeline (normalized) sample rate in Hz
    pub sample_rate: u32,
    /// Audio required in the jitter buffer before playback starts
    pub pre_buffer_threshold_ms: f64,
    /// Ring buffer capacity in seconds
    pub max_buffer_seconds: f64,
    /// Admission cap: chunks are rejected while this much audio is buffered
    pub max_buffered_ms: f64,
    /// Admission floor: shorter chunks are rejected
    pub min_chunk_samples: usize,
    pub underrun_strategy: UnderrunStrategy,
    /// Output gain, clamped to [0, 2]
    pub initial_gain: f32,
    /// Clamp converted samples to [-1, 1]
    pub clamp_samples: bool,
    /// Align the first scheduled chunk of a session at a zero crossing
    pub use_zero_crossing: bool,
    pub zero_crossing: ZeroCrossingConfig,
    /// Samples per scheduled output buffer
    pub chunk_size_samples: usize,
    /// FIFO queue count limit
    pub fifo_max_size: usize,
    /// FIFO queue byte limit
    pub fifo_max_bytes: usize,
    /// Processing tick period
    pub processing_interval_ms: u64,
    /// Metrics event period
    pub metrics_interval_ms: u64,
    /// Fill policy while buffering
    pub aggressive_fill: FillPolicy,
    /// Fill policy once playing
    pub conservative_fill: FillPolicy,
    /// First buffer starts this far ahead of the device clock
    pub schedule_lead_ms: f64,
    /// No new buffer is scheduled while this much audio is already queued on the device
    pub max_schedule_ahead_ms: f64,
    /// Buffering guard
    pub buffering_timeout_ms: u64,
    /// Drain ceiling after upstream ends
    pub drain_timeout_ms: u64,
    /// Event bus capacity per subscriber
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            pre_buffer_threshold_ms: 300.0,
            max_buffer_seconds: 5.0,
            max_buffered_ms: 2000.0,
            min_chunk_samples: 32,
            underrun_strategy: UnderrunStrategy::Silence,
            initial_gain: 1.0,
            clamp_samples: true,
            use_zero_crossing: true,
            zero_crossing: ZeroCrossingConfig::default(),
            chunk_size_samples: 2048,
            fifo_max_size: 256,
            fifo_max_bytes: 2 * 1024 * 1024,
            processing_interval_ms: 50,
            metrics_interval_ms: 250,
            aggressive_fill: FillPolicy {
                target_ms: 1500.0,
                max_chunks_per_tick: 16,
            },
            conservative_fill: FillPolicy {
                target_ms: 1000.0,
                max_chunks_per_tick: 4,
            },
            schedule_lead_ms: 50.0,
            max_schedule_ahead_ms: 400.0,
            buffering_timeout_ms: 3000,
            drain_timeout_ms: 30_000,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Validate ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(Error::Config(format!(
                "sample_rate {} outside 8000..=192000",
                self.sample_rate
            )));
        }
        if self.pre_buffer_threshold_ms < 0.0 {
            return Err(Error::Config("pre_buffer_threshold_ms must be >= 0".to_string()));
        }
        if self.max_buffer_seconds <= 0.0 {
            return Err(Error::Config("max_buffer_seconds must be > 0".to_string()));
        }
        let capacity_ms = self.max_buffer_seconds * 1000.0;
        if self.pre_buffer_threshold_ms > capacity_ms {
            return Err(Error::Config(format!(
                "pre_buffer_threshold_ms {} exceeds ring capacity {}ms",
                self.pre_buffer_threshold_ms, capacity_ms
            )));
        }
        if self.max_buffered_ms > capacity_ms {
            return Err(Error::Config(format!(
                "max_buffered_ms {} exceeds ring capacity {}ms",
                self.max_buffered_ms, capacity_ms
            )));
        }
        if self.chunk_size_samples == 0 {
            return Err(Error::Config("chunk_size_samples must be > 0".to_string()));
        }
        if self.fifo_max_size == 0 || self.fifo_max_bytes == 0 {
            return Err(Error::Config("FIFO limits must be > 0".to_string()));
        }
        if self.processing_interval_ms == 0 || self.metrics_interval_ms == 0 {
            return Err(Error::Config("tick intervals must be > 0".to_string()));
        }
        for (name, policy) in [
            ("aggressive_fill", &self.aggressive_fill),
            ("conservative_fill", &self.conservative_fill),
        ] {
            if policy.max_chunks_per_tick == 0 {
                return Err(Error::Config(format!("{}.max_chunks_per_tick must be > 0", name)));
            }
            if policy.target_ms > self.max_buffered_ms {
                return Err(Error::Config(format!(
                    "{}.target_ms {} exceeds max_buffered_ms {}",
                    name, policy.target_ms, self.max_buffered_ms
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.initial_gain) {
            return Err(Error::Config(format!(
                "initial_gain {} outside 0.0..=2.0",
                self.initial_gain
            )));
        }
        if self.schedule_lead_ms < 0.0 || self.max_schedule_ahead_ms <= 0.0 {
            return Err(Error::Config("schedule window must be positive".to_string()));
        }
        self.zero_crossing.validate()?;

        Ok(())
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn buffering_timeout(&self) -> Duration {
        Duration::from_millis(self.buffering_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Log the effective tuning once at startup
    pub fn log_summary(&self) {
        info!(
            "Engine config: {}Hz, threshold={}ms, capacity={}s, chunk={} samples, strategy={}",
            self.sample_rate,
            self.pre_buffer_threshold_ms,
            self.max_buffer_seconds,
            self.chunk_size_samples,
            self.underrun_strategy
        );
    }
}

/// Output device configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Device name (None = system default)
    pub device: Option<String>,
    /// Use the clock-only null device instead of real hardware
    pub null_device: bool,
    /// Fixed device buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
    /// Null device rate (None = engine sample rate)
    pub null_sample_rate: Option<u32>,
}

impl OutputConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.buffer_size {
            if !(64..=65_536).contains(&size) {
                return Err(Error::Config(format!(
                    "output buffer_size {} outside 64..=65536",
                    size
                )));
            }
        }
        if self.null_sample_rate == Some(0) {
            return Err(Error::Config("null_sample_rate must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.engine.sample_rate, 16_000);
        assert_eq!(config.engine.chunk_size_samples, 2048);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [engine]
            pre_buffer_threshold_ms = 150
            underrun_strategy = "repeat"

            [engine.conservative_fill]
            target_ms = 800
            max_chunks_per_tick = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.pre_buffer_threshold_ms, 150.0);
        assert_eq!(config.engine.underrun_strategy, UnderrunStrategy::Repeat);
        assert_eq!(config.engine.conservative_fill.max_chunks_per_tick, 2);
        assert_eq!(config.engine.aggressive_fill.target_ms, 1500.0);
        assert!(!config.output.null_device);
    }

    #[test]
    fn test_threshold_above_capacity_rejected() {
        let config = EngineConfig {
            pre_buffer_threshold_ms: 6000.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_gain_out_of_range_rejected() {
        let config = EngineConfig {
            initial_gain: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_allowed() {
        let config = EngineConfig {
            pre_buffer_threshold_ms: 0.0,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("PAUSE".parse::<UnderrunStrategy>().unwrap(), UnderrunStrategy::Pause);
        assert!("loop".parse::<UnderrunStrategy>().is_err());
    }

    #[test]
    fn test_output_buffer_size_validated() {
        let output = OutputConfig {
            buffer_size: Some(16),
            ..Default::default()
        };
        assert!(output.validate().is_err());
    }
}
