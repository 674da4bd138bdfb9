//! Error types for vocoach-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Recoverable conditions (FIFO drops, admission rejects) are counters, not errors.

use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed inbound chunk (empty, odd byte length)
    #[error("Invalid audio chunk: {0}")]
    Validation(String),

    /// No audio arrived before the buffering guard fired
    #[error(
        "Buffering timeout after {waited_ms}ms: {chunks_received} chunks received, \
         {fifo_size} queued, {available_samples} samples buffered"
    )]
    BufferingTimeout {
        waited_ms: u64,
        chunks_received: u64,
        fifo_size: usize,
        available_samples: usize,
    },

    /// Scheduled audio did not finish draining within the ceiling
    #[error("Drain timeout after {0}ms")]
    DrainTimeout(u64),

    /// Upstream chunk source failure (message preserved from the provider)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// WAV reading errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Shared configuration/IO errors
    #[error(transparent)]
    Common(#[from] vocoach_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffering_timeout_message_carries_counters() {
        let err = Error::BufferingTimeout {
            waited_ms: 3000,
            chunks_received: 0,
            fifo_size: 0,
            available_samples: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("3000ms"));
        assert!(msg.contains("0 chunks received"));
    }

    #[test]
    fn test_upstream_message_preserved() {
        let err = Error::Upstream("connection reset by peer".to_string());
        assert_eq!(err.to_string(), "Upstream error: connection reset by peer");
    }
}
