//! Audio subsystem
//!
//! PCM16 conversion, device-ready buffers and the output device.

pub mod converter;
pub mod output;
pub mod timeline;
pub mod types;

pub use converter::SampleConverter;
pub use output::AudioOutput;
pub use timeline::{ScheduledSpan, SourceId};
pub use types::{AudioChunk, ConvertedAudio, PlayableBuffer};
