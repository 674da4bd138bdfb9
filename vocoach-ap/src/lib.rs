//! # Vocoach Audio Player Library (vocoach-ap)
//!
//! Real-time playback engine for streamed PCM16 speech.
//!
//! **Purpose:** Accept little-endian PCM16 chunks from a speech synthesis
//! stream, absorb network jitter in a pre-buffer, and schedule gapless,
//! click-free audio on an output device.
//!
//! **Architecture:** Provider stream → FIFO queue → converter/resampler →
//! jitter buffer (ring buffer) → zero-crossing alignment → absolute-time
//! scheduling on a cpal (or null) output device. One session task per
//! `speak()` drives the pipeline; state and events are published to
//! observers.

pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod playback;
pub mod provider;

pub use audio::{AudioChunk, AudioOutput, PlayableBuffer, SampleConverter, ScheduledSpan};
pub use config::{AppConfig, EngineConfig, FillPolicy, LoggingConfig, OutputConfig, UnderrunStrategy};
pub use context::AudioContext;
pub use error::{Error, Result};
pub use playback::{
    AlignMode, CircularBuffer, FifoQueue, JitterBuffer, JitterState, PipelineStats, StreamingPlayer,
    ZeroCrossingAligner, ZeroCrossingConfig,
};
pub use provider::{ChunkStream, MemoryProvider, SpeakOptions, SpeechProvider, Step, WavFileProvider};
pub use vocoach_common::events::{
    DoneReason, EventBus, MetricsSnapshot, PlayerErrorKind, PlayerEvent, PlayerState, Subscription,
};
