//! Scripted in-memory provider
//!
//! Replays a fixed script of chunks, delays and failures. Used for demos,
//! benchmarks and tests that need deterministic upstream timing.

use super::{ChunkStream, SpeakOptions, SpeechProvider};
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One scripted upstream event
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Yield a PCM16 payload
    Chunk(Vec<u8>),
    /// Wait before the next step
    Delay(Duration),
    /// Yield an upstream error and end the stream
    Fail(String),
    /// Never yield again (a stalled connection)
    Stall,
}

#[derive(Clone)]
pub struct MemoryProvider {
    name: String,
    sample_rate: u32,
    steps: Arc<Vec<Step>>,
    connect_delay: Duration,
    connect_error: Option<String>,
}

impl MemoryProvider {
    /// Provider yielding `chunks` back to back
    pub fn new(sample_rate: u32, chunks: Vec<Vec<u8>>) -> Self {
        Self::scripted(sample_rate, chunks.into_iter().map(Step::Chunk).collect())
    }

    /// Provider replaying `steps` in order
    pub fn scripted(sample_rate: u32, steps: Vec<Step>) -> Self {
        Self {
            name: "memory".to_string(),
            sample_rate,
            steps: Arc::new(steps),
            connect_delay: Duration::ZERO,
            connect_error: None,
        }
    }

    /// Insert `interval` between consecutive chunks
    pub fn with_interval(self, interval: Duration) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() * 2);
        for step in self.steps.iter() {
            if matches!(step, Step::Chunk(_)) && !steps.is_empty() {
                steps.push(Step::Delay(interval));
            }
            steps.push(step.clone());
        }
        Self {
            steps: Arc::new(steps),
            ..self
        }
    }

    /// Delay before the stream opens
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Fail at connect time with `message`
    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Total PCM16 bytes the script yields
    pub fn total_bytes(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Chunk(bytes) => bytes.len(),
                _ => 0,
            })
            .sum()
    }
}

impl SpeechProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open_stream(&self, text: &str, _options: &SpeakOptions) -> BoxFuture<'static, Result<ChunkStream>> {
        let steps = Arc::clone(&self.steps);
        let connect_delay = self.connect_delay;
        let connect_error = self.connect_error.clone();
        debug!("Memory provider opening stream for {} chars", text.len());

        Box::pin(async move {
            if !connect_delay.is_zero() {
                tokio::time::sleep(connect_delay).await;
            }
            if let Some(message) = connect_error {
                return Err(Error::Upstream(message));
            }

            let stream = async_stream::stream! {
                for step in steps.iter() {
                    match step {
                        Step::Chunk(bytes) => yield Ok(bytes.clone()),
                        Step::Delay(delay) => tokio::time::sleep(*delay).await,
                        Step::Fail(message) => {
                            yield Err(Error::Upstream(message.clone()));
                            return;
                        }
                        Step::Stall => futures::future::pending::<()>().await,
                    }
                }
            };
            Ok(stream.boxed())
        })
    }
}
