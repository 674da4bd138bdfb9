//! Player-related type definitions
//!
//! Supporting types for the streaming player state machine, completion
//! reasons, and the metrics snapshot carried by events.

use serde::{Deserialize, Serialize};

/// Streaming player state
///
/// One session walks `Idle → Connecting → Buffering → Playing → Done`, with
/// `Paused` reachable from any state after `Connecting` and `Stopped`/`Error`
/// as the other terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// No session started yet
    #[default]
    Idle,
    /// Opening the upstream chunk source
    Connecting,
    /// Accumulating audio before playback starts
    Buffering,
    /// Audio is being scheduled on the output device
    Playing,
    /// Scheduling stops and queued audio holds its position
    Paused,
    /// Session cancelled by the caller
    Stopped,
    /// Session finished and all audio drained
    Done,
    /// Session failed; terminal until the next `speak()`
    Error,
}

impl PlayerState {
    /// Terminal states end a session; the next `speak()` starts over
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerState::Stopped | PlayerState::Done | PlayerState::Error)
    }

    /// States in which `pause()`/`resume()` are meaningful
    pub fn is_controllable(&self) -> bool {
        matches!(
            self,
            PlayerState::Buffering | PlayerState::Playing | PlayerState::Paused
        )
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Connecting => write!(f, "connecting"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Stopped => write!(f, "stopped"),
            PlayerState::Done => write!(f, "done"),
            PlayerState::Error => write!(f, "error"),
        }
    }
}

/// Why a session emitted its completion signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// Upstream ended and every scheduled buffer finished playing
    Drained,
    /// `stop()` was called after playback had begun
    Stopped,
    /// Drain did not complete within the configured ceiling and was forced
    DrainTimeout,
}

/// Category of a fatal session error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerErrorKind {
    /// No audio arrived within the buffering timeout
    BufferingTimeout,
    /// The upstream chunk source failed
    Upstream,
    /// The output device could not be opened or scheduled
    AudioOutput,
    /// Session task failure
    Internal,
}

/// Buffer-health and latency snapshot
///
/// Emitted periodically and attached to playing/underrun/done/error events.
/// Display-only for consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Audio currently held by the jitter buffer (ms)
    pub buffer_duration_ms: f64,
    /// Pre-buffer threshold (ms)
    pub threshold_ms: f64,
    /// Buffered duration as a percentage of the threshold (may exceed 100)
    pub buffer_percent: f64,
    /// Normalized samples currently held by the jitter buffer
    pub samples_queued: usize,
    /// Time from `speak()` to the first inbound chunk (ms)
    pub first_chunk_latency_ms: Option<f64>,
    /// Time from `speak()` to the first scheduled sound (ms)
    pub first_sound_latency_ms: Option<f64>,
    /// Chunks rejected by the jitter buffer admission guard
    pub dropped_chunks: u64,
    /// Chunks evicted from the FIFO queue (drop-oldest)
    pub fifo_dropped: u64,
    /// Underruns observed while playing
    pub underrun_count: u64,
    /// Samples overwritten in the ring buffer
    pub overflow_samples: u64,
    /// Chunks that failed PCM16 validation
    pub conversion_errors: u64,
    /// Inbound chunk rate since the first chunk
    pub chunks_per_second: f64,
    /// Chunks currently waiting in the FIFO queue
    pub fifo_size: usize,
    /// Bytes currently waiting in the FIFO queue
    pub fifo_bytes: usize,
    /// Chunks received from upstream this session
    pub chunks_received: u64,
    /// Buffers handed to the output device this session
    pub chunks_scheduled: u64,
    /// Output buffers still playing
    pub active_sources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PlayerState::Done.is_terminal());
        assert!(PlayerState::Stopped.is_terminal());
        assert!(PlayerState::Error.is_terminal());
        assert!(!PlayerState::Playing.is_terminal());
        assert!(!PlayerState::Idle.is_terminal());
    }

    #[test]
    fn test_controllable_states() {
        assert!(PlayerState::Buffering.is_controllable());
        assert!(PlayerState::Paused.is_controllable());
        assert!(!PlayerState::Connecting.is_controllable());
        assert!(!PlayerState::Done.is_controllable());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&PlayerState::Buffering).unwrap();
        assert_eq!(json, "\"buffering\"");
        assert_eq!(PlayerState::Buffering.to_string(), "buffering");
    }

    #[test]
    fn test_done_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DoneReason::DrainTimeout).unwrap();
        assert_eq!(json, "\"drain_timeout\"");
    }
}
