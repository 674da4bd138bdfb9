//! Buffering stages and the streaming player state machine

pub mod circular_buffer;
pub mod fifo_queue;
pub mod jitter_buffer;
pub mod pipeline;
pub mod player;
mod session;
pub mod zero_crossing;

pub use circular_buffer::{CircularBuffer, ReadResult};
pub use fifo_queue::{FifoQueue, FifoStats, QueueItem};
pub use jitter_buffer::{AddOutcome, BufferHealth, JitterBuffer, JitterConfig, JitterState, NextChunk};
pub use pipeline::{Pipeline, PipelineStats};
pub use player::StreamingPlayer;
pub use zero_crossing::{AlignMode, AlignResult, ZeroCrossingAligner, ZeroCrossingConfig};
