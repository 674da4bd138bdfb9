//! Upstream speech providers
//!
//! A provider turns text into a stream of raw PCM16 chunks at its native
//! sample rate. The player owns the stream for one session and drops it to
//! cancel the upstream request.
//!
//! **Contract:**
//! - chunks are little-endian signed 16-bit mono
//! - the stream ends (`None`) when synthesis is complete
//! - a failure is yielded as `Err`; the message reaches the session's
//!   error event unchanged

mod memory;
mod wav;

pub use memory::{MemoryProvider, Step};
pub use wav::WavFileProvider;

use crate::error::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of raw PCM16 payloads
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// Per-request synthesis options, passed through to the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeakOptions {
    /// Provider-specific voice name
    pub voice: Option<String>,
    /// Speaking-rate multiplier (1.0 = normal)
    pub speed: Option<f32>,
    /// Free-form style instructions
    pub instructions: Option<String>,
}

/// Source of streamed speech audio
pub trait SpeechProvider: Send + Sync {
    /// Short name used in logs and events
    fn name(&self) -> &str;

    /// Rate of the PCM16 chunks this provider yields
    fn native_sample_rate(&self) -> u32;

    /// Open a chunk stream for `text`.
    ///
    /// The returned future resolves once the upstream connection is
    /// established; errors here fail the session before buffering starts.
    fn open_stream(&self, text: &str, options: &SpeakOptions) -> BoxFuture<'static, Result<ChunkStream>>;
}
