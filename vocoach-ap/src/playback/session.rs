//! One speak() session: the cooperative processing loop
//!
//! A session task owns the pipeline for its lifetime and multiplexes four
//! inputs on one `tokio::select!` loop:
//!
//! - control commands (pause/resume/stop) from the player handle
//! - the upstream chunk stream, polled only while the FIFO has room
//! - the processing tick: FIFO → converter → jitter buffer → device
//! - the metrics tick
//!
//! Every session that leaves `Connecting` ends in exactly one terminal state
//! (`Done`, `Stopped` or `Error`), and the `Done` event is emitted at most
//! once. Cancellation is cooperative: the abort flag and the stop command
//! are both checked before any further upstream read or scheduling.

use crate::audio::{AudioChunk, AudioOutput};
use crate::config::EngineConfig;
use crate::context::AudioContext;
use crate::error::Error;
use crate::playback::pipeline::Pipeline;
use crate::playback::zero_crossing::AlignMode;
use crate::provider::{ChunkStream, SpeakOptions, SpeechProvider};
use crate::Result;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vocoach_common::events::{
    DoneReason, EventBus, MetricsSnapshot, PlayerErrorKind, PlayerEvent, PlayerState,
};
use vocoach_common::time::{self, duration_ms};

/// Control messages from the player handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Pause,
    Resume,
    Stop,
}

/// Everything a session needs from its player
pub(crate) struct SessionParams {
    pub id: Uuid,
    pub provider: Arc<dyn SpeechProvider>,
    pub config: Arc<EngineConfig>,
    pub events: EventBus,
    pub state_tx: Arc<watch::Sender<PlayerState>>,
    pub metrics_tx: Arc<watch::Sender<MetricsSnapshot>>,
    pub control_rx: mpsc::Receiver<Command>,
    pub abort: Arc<AtomicBool>,
    pub pipeline: Pipeline,
}

#[derive(Debug, Default)]
struct Counters {
    chunks_received: u64,
    chunks_scheduled: u64,
    conversion_errors: u64,
    first_chunk_at: Option<Instant>,
    first_chunk_latency_ms: Option<f64>,
    first_sound_latency_ms: Option<f64>,
}

pub(crate) struct Session {
    id: Uuid,
    provider: Arc<dyn SpeechProvider>,
    config: Arc<EngineConfig>,
    events: EventBus,
    state_tx: Arc<watch::Sender<PlayerState>>,
    metrics_tx: Arc<watch::Sender<MetricsSnapshot>>,
    control_rx: mpsc::Receiver<Command>,
    abort: Arc<AtomicBool>,
    pipeline: Pipeline,
    output: Option<Arc<AudioOutput>>,

    state: PlayerState,
    /// State to return to on resume
    resume_state: PlayerState,
    counters: Counters,
    started_at: Instant,
    buffering_since: Instant,
    paused_at: Option<Instant>,
    upstream_done_at: Option<Instant>,
    playback_started: bool,
    done_emitted: bool,
    first_chunk_aligned: bool,
    /// Our sources are held on the output
    holding_output: bool,
    /// Device time at which the next buffer starts
    next_start: f64,
}

impl Session {
    pub(crate) fn new(params: SessionParams) -> Self {
        let now = Instant::now();
        Self {
            id: params.id,
            provider: params.provider,
            config: params.config,
            events: params.events,
            state_tx: params.state_tx,
            metrics_tx: params.metrics_tx,
            control_rx: params.control_rx,
            abort: params.abort,
            pipeline: params.pipeline,
            output: None,
            state: PlayerState::Idle,
            resume_state: PlayerState::Buffering,
            counters: Counters::default(),
            started_at: now,
            buffering_since: now,
            paused_at: None,
            upstream_done_at: None,
            playback_started: false,
            done_emitted: false,
            first_chunk_aligned: false,
            holding_output: false,
            next_start: 0.0,
        }
    }

    /// Run the session to a terminal state and hand the pipeline back
    pub(crate) async fn run(mut self, text: String, options: SpeakOptions, context: AudioContext) -> Pipeline {
        self.set_state(PlayerState::Connecting);
        self.events.emit_lossy(PlayerEvent::Connecting {
            session_id: self.id,
            provider: self.provider.name().to_string(),
            timestamp: time::now(),
        });

        match context.output().await {
            Ok(output) => self.output = Some(output),
            Err(e) => {
                self.fail(PlayerErrorKind::AudioOutput, e.to_string());
                return self.pipeline;
            }
        }

        let Some(stream) = self.connect(&text, &options).await else {
            return self.pipeline;
        };

        self.events.emit_lossy(PlayerEvent::Connected {
            session_id: self.id,
            timestamp: time::now(),
        });
        self.enter_buffering();
        self.process(stream).await;

        self.pipeline
    }

    /// Open the upstream stream; stop is honoured while waiting
    async fn connect(&mut self, text: &str, options: &SpeakOptions) -> Option<ChunkStream> {
        let mut open = self.provider.open_stream(text, options);
        loop {
            tokio::select! {
                result = &mut open => {
                    return match result {
                        Ok(stream) if !self.abort.load(Ordering::SeqCst) => Some(stream),
                        Ok(_) => {
                            self.finish_stopped();
                            None
                        }
                        Err(e) => {
                            self.fail(PlayerErrorKind::Upstream, upstream_message(e));
                            None
                        }
                    };
                }
                command = self.control_rx.recv() => match command {
                    Some(Command::Stop) | None => {
                        self.finish_stopped();
                        return None;
                    }
                    Some(other) => debug!("Ignoring {:?} while connecting", other),
                }
            }
        }
    }

    async fn process(&mut self, stream: ChunkStream) {
        let mut upstream = Some(stream);

        let mut tick = interval(self.config.processing_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let metrics_period = self.config.metrics_interval();
        let mut metrics_tick = interval_at(Instant::now() + metrics_period, metrics_period);
        metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.state.is_terminal() {
            if self.abort.load(Ordering::SeqCst) {
                self.finish_stopped();
                break;
            }
            let wants_upstream = upstream.is_some() && self.pipeline.fifo.has_capacity();

            tokio::select! {
                biased;

                command = self.control_rx.recv() => self.handle_command(command),

                item = next_item(&mut upstream), if wants_upstream => match item {
                    Some(Ok(bytes)) => self.on_chunk(bytes),
                    Some(Err(e)) => {
                        upstream = None;
                        self.fail(PlayerErrorKind::Upstream, upstream_message(e));
                    }
                    None => {
                        upstream = None;
                        self.on_upstream_end();
                    }
                },

                _ = tick.tick() => self.process_tick(),

                _ = metrics_tick.tick() => self.emit_metrics(),
            }
        }

        // Dropping the stream cancels the upstream request
        drop(upstream);
    }

    fn handle_command(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Stop) | None => self.finish_stopped(),
            Some(Command::Pause) => self.pause(),
            Some(Command::Resume) => self.resume(),
        }
    }

    fn on_chunk(&mut self, bytes: Vec<u8>) {
        if self.counters.first_chunk_at.is_none() {
            let latency = duration_ms(self.started_at.elapsed());
            self.counters.first_chunk_at = Some(Instant::now());
            self.counters.first_chunk_latency_ms = Some(latency);
            info!("First chunk after {:.0}ms", latency);
        }

        let sequence = self.counters.chunks_received;
        self.counters.chunks_received += 1;
        self.pipeline.fifo.enqueue(AudioChunk::new(bytes, sequence));
    }

    fn on_upstream_end(&mut self) {
        info!(
            "Upstream finished after {} chunks",
            self.counters.chunks_received
        );
        self.upstream_done_at = Some(Instant::now());
    }

    fn upstream_done(&self) -> bool {
        self.upstream_done_at.is_some()
    }

    fn process_tick(&mut self) {
        match self.state {
            PlayerState::Buffering => {
                self.fill_jitter();
                self.check_start();
            }
            PlayerState::Playing => self.fill_jitter(),
            _ => return,
        }

        if self.state == PlayerState::Playing {
            if let Err(e) = self.schedule_ahead() {
                self.fail(PlayerErrorKind::AudioOutput, e.to_string());
                return;
            }
            self.check_completion();
        }
    }

    /// Move chunks FIFO → converter → jitter buffer under the current fill policy
    fn fill_jitter(&mut self) {
        let policy = if self.playback_started {
            self.config.conservative_fill
        } else {
            self.config.aggressive_fill
        };
        let native_rate = self.provider.native_sample_rate();
        let pipeline_rate = self.config.sample_rate;

        let mut moved = 0;
        while moved < policy.max_chunks_per_tick
            && self.pipeline.jitter.duration_ms() < policy.target_ms
        {
            let Some(chunk) = self.pipeline.fifo.dequeue() else {
                break;
            };
            moved += 1;

            match self
                .pipeline
                .converter
                .normalize(&chunk.payload, native_rate, pipeline_rate)
            {
                Ok(audio) => {
                    let outcome = self.pipeline.jitter.add_chunk(&audio.data);
                    if !outcome.is_accepted() {
                        debug!("Chunk #{} not admitted: {:?}", chunk.sequence, outcome);
                    }
                }
                Err(e) => {
                    self.counters.conversion_errors += 1;
                    warn!(
                        "Skipping chunk #{} ({} bytes, {:.0}ms buffered): {}",
                        chunk.sequence,
                        chunk.size_bytes(),
                        self.pipeline.jitter.duration_ms(),
                        e
                    );
                }
            }
        }
    }

    /// Leave Buffering: threshold reached, upstream ended, or guard timer fired
    fn check_start(&mut self) {
        if self.pipeline.jitter.can_start_playback() {
            self.start_playback();
            return;
        }

        let available = self.pipeline.jitter.available();
        if self.upstream_done() && self.pipeline.fifo.is_empty() {
            if available > 0 {
                info!("Upstream ended below threshold, playing {} samples", available);
                self.start_playback();
            } else {
                info!("Upstream ended without audio");
                self.finish_done(DoneReason::Drained);
            }
            return;
        }

        let waited = self.buffering_since.elapsed();
        if waited >= self.config.buffering_timeout() {
            if available > 0 {
                warn!(
                    "Buffering for {:.0}ms without reaching threshold, starting with {:.0}ms",
                    duration_ms(waited),
                    self.pipeline.jitter.duration_ms()
                );
                self.start_playback();
            } else {
                let err = Error::BufferingTimeout {
                    waited_ms: waited.as_millis() as u64,
                    chunks_received: self.counters.chunks_received,
                    fifo_size: self.pipeline.fifo.len(),
                    available_samples: available,
                };
                self.fail(PlayerErrorKind::BufferingTimeout, err.to_string());
            }
        }
    }

    fn start_playback(&mut self) {
        let Some(output) = self.output.clone() else {
            return;
        };
        self.pipeline.jitter.mark_playing();
        self.next_start = output.current_time() + self.config.schedule_lead_ms / 1000.0;
        self.playback_started = true;
        self.set_state(PlayerState::Playing);

        let metrics = self.snapshot();
        info!(
            "Playback starting with {:.0}ms buffered",
            metrics.buffer_duration_ms
        );
        self.events.emit_lossy(PlayerEvent::Playing {
            session_id: self.id,
            metrics,
            timestamp: time::now(),
        });
    }

    /// Keep up to `max_schedule_ahead_ms` of audio queued on the device
    fn schedule_ahead(&mut self) -> Result<()> {
        let Some(output) = self.output.clone() else {
            return Ok(());
        };
        let max_ahead = self.config.max_schedule_ahead_ms / 1000.0;

        loop {
            let now = output.current_time();
            if self.next_start < now {
                // The clock passed the cursor (gap after an underrun)
                self.next_start = now + self.config.schedule_lead_ms / 1000.0;
            }
            if self.next_start - now >= max_ahead {
                return Ok(());
            }
            if !self.schedule_one(&output, now)? {
                return Ok(());
            }
        }
    }

    /// Schedule the next chunk; false when nothing was available
    fn schedule_one(&mut self, output: &AudioOutput, now: f64) -> Result<bool> {
        let chunk_size = self.config.chunk_size_samples;
        let draining = self.upstream_done() && self.pipeline.fifo.is_empty();

        let mut data = if draining {
            // Tail: play what is left, no padding
            self.pipeline.jitter.drain_tail(chunk_size)
        } else {
            if self.pipeline.jitter.awaiting_refill() {
                return Ok(false);
            }
            // A short read is only taken when the device would run dry
            // before the next tick
            let queued = self.next_start - now;
            if self.pipeline.jitter.available() < chunk_size
                && queued > self.config.processing_interval().as_secs_f64()
            {
                return Ok(false);
            }
            let next = self.pipeline.jitter.get_next_chunk(chunk_size);
            if next.new_underrun {
                self.emit_underrun();
            }
            next.data
        };
        if data.is_empty() {
            return Ok(false);
        }

        if self.config.use_zero_crossing && !self.first_chunk_aligned {
            self.first_chunk_aligned = true;
            let aligned = self.pipeline.aligner.align(&data, AlignMode::Start);
            if aligned.success && aligned.trimmed_start > 0 {
                debug!("Aligned first chunk: trimmed {} samples", aligned.trimmed_start);
                data = aligned.data;
            }
        }

        let buffer = output.create_buffer(data, self.config.sample_rate);
        let span = output.schedule_buffer(self.id, &buffer, self.next_start)?;
        self.next_start = span.start_time + buffer.duration_secs();
        self.counters.chunks_scheduled += 1;

        if self.counters.first_sound_latency_ms.is_none() {
            let until_start = (span.start_time - now).max(0.0) * 1000.0;
            let latency = duration_ms(self.started_at.elapsed()) + until_start;
            self.counters.first_sound_latency_ms = Some(latency);
            info!("First sound at {:.0}ms after speak()", latency);
        }

        Ok(true)
    }

    /// Done once upstream ended, everything drained and no source is playing
    fn check_completion(&mut self) {
        let Some(done_at) = self.upstream_done_at else {
            return;
        };
        let Some(output) = self.output.clone() else {
            return;
        };

        if self.pipeline.is_drained() && output.active_sources_for(self.id) == 0 {
            info!(
                "Playback drained: {} chunks received, {} scheduled",
                self.counters.chunks_received, self.counters.chunks_scheduled
            );
            self.finish_done(DoneReason::Drained);
            return;
        }

        let waited = done_at.elapsed();
        if waited >= self.config.drain_timeout() {
            warn!(
                "{} with {} sources active, forcing completion",
                Error::DrainTimeout(waited.as_millis() as u64),
                output.active_sources_for(self.id)
            );
            let metrics = self.snapshot();
            output.cancel_owner(self.id);
            self.pipeline.reset();
            self.set_state(PlayerState::Done);
            self.emit_done(DoneReason::DrainTimeout, metrics);
        }
    }

    fn pause(&mut self) {
        if !matches!(self.state, PlayerState::Buffering | PlayerState::Playing) {
            debug!("Pause ignored in state {}", self.state);
            return;
        }
        self.resume_state = self.state;
        self.paused_at = Some(Instant::now());
        if let Some(output) = &self.output {
            output.hold(self.id);
            self.holding_output = true;
        }
        self.set_state(PlayerState::Paused);
        self.events.emit_lossy(PlayerEvent::Paused {
            session_id: self.id,
            timestamp: time::now(),
        });
    }

    fn resume(&mut self) {
        if self.state != PlayerState::Paused {
            debug!("Resume ignored in state {}", self.state);
            return;
        }

        // Guards measure active time only
        let paused_for = self
            .paused_at
            .take()
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        self.buffering_since += paused_for;
        if let Some(done_at) = self.upstream_done_at.as_mut() {
            *done_at += paused_for;
        }

        if let Some(output) = &self.output {
            // Queued audio moved later by the paused span; keep the cursor behind it
            self.next_start += output.release(self.id);
            self.holding_output = false;
        }

        let state = self.resume_state;
        self.set_state(state);
        if state == PlayerState::Playing {
            self.events.emit_lossy(PlayerEvent::Playing {
                session_id: self.id,
                metrics: self.snapshot(),
                timestamp: time::now(),
            });
        } else {
            self.events.emit_lossy(PlayerEvent::Buffering {
                session_id: self.id,
                timestamp: time::now(),
            });
        }
    }

    fn enter_buffering(&mut self) {
        self.buffering_since = Instant::now();
        self.set_state(PlayerState::Buffering);
        self.events.emit_lossy(PlayerEvent::Buffering {
            session_id: self.id,
            timestamp: time::now(),
        });
    }

    /// Caller-initiated cancellation
    fn finish_stopped(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let metrics = self.snapshot();
        info!(
            "Session stopped in state {} ({} chunks received)",
            self.state, self.counters.chunks_received
        );

        self.release_device();
        self.pipeline.reset();
        self.set_state(PlayerState::Stopped);
        self.events.emit_lossy(PlayerEvent::Stopped {
            session_id: self.id,
            timestamp: time::now(),
        });
        if self.playback_started {
            self.emit_done(DoneReason::Stopped, metrics);
        }
    }

    fn finish_done(&mut self, reason: DoneReason) {
        if self.state.is_terminal() {
            return;
        }
        let metrics = self.snapshot();
        self.release_device();
        self.set_state(PlayerState::Done);
        self.emit_done(reason, metrics);
    }

    fn fail(&mut self, kind: PlayerErrorKind, message: String) {
        if self.state.is_terminal() {
            return;
        }
        let metrics = self.snapshot();
        error!("Session failed ({:?}): {}", kind, message);

        self.release_device();
        self.pipeline.reset();
        self.pipeline.jitter.set_error();
        self.set_state(PlayerState::Error);
        self.metrics_tx.send_replace(metrics.clone());
        self.events.emit_lossy(PlayerEvent::Error {
            session_id: self.id,
            kind,
            message,
            metrics,
            timestamp: time::now(),
        });
    }

    fn emit_done(&mut self, reason: DoneReason, metrics: MetricsSnapshot) {
        if self.done_emitted {
            return;
        }
        self.done_emitted = true;
        self.metrics_tx.send_replace(metrics.clone());
        self.events.emit_lossy(PlayerEvent::Done {
            session_id: self.id,
            reason,
            metrics,
            timestamp: time::now(),
        });
    }

    fn emit_underrun(&mut self) {
        let metrics = self.snapshot();
        warn!(
            "Underrun #{} with {:.0}ms buffered",
            metrics.underrun_count, metrics.buffer_duration_ms
        );
        self.events.emit_lossy(PlayerEvent::Underrun {
            session_id: self.id,
            metrics,
            timestamp: time::now(),
        });
    }

    fn emit_metrics(&mut self) {
        if !self.state.is_controllable() {
            return;
        }
        let metrics = self.snapshot();
        self.metrics_tx.send_replace(metrics.clone());
        self.events.emit_lossy(PlayerEvent::Metrics {
            session_id: self.id,
            metrics,
            timestamp: time::now(),
        });
    }

    /// Undo device-level effects of this session
    fn release_device(&mut self) {
        if let Some(output) = &self.output {
            if self.holding_output {
                output.release(self.id);
                self.holding_output = false;
            }
            output.cancel_owner(self.id);
        }
    }

    fn set_state(&mut self, new_state: PlayerState) {
        if self.state == new_state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        self.state_tx.send_replace(new_state);
        debug!("Player state {} -> {}", old_state, new_state);
        self.events.emit_lossy(PlayerEvent::StateChanged {
            session_id: self.id,
            old_state,
            new_state,
            timestamp: time::now(),
        });
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let health = self.pipeline.jitter.health();
        let fifo = self.pipeline.fifo.stats();
        let chunks_per_second = self
            .counters
            .first_chunk_at
            .map(|at| at.elapsed().as_secs_f64())
            .filter(|secs| *secs > 0.0)
            .map(|secs| self.counters.chunks_received as f64 / secs)
            .unwrap_or(0.0);

        MetricsSnapshot {
            buffer_duration_ms: health.current_ms,
            threshold_ms: health.threshold_ms,
            buffer_percent: health.percent,
            samples_queued: health.available_samples,
            first_chunk_latency_ms: self.counters.first_chunk_latency_ms,
            first_sound_latency_ms: self.counters.first_sound_latency_ms,
            dropped_chunks: health.dropped_chunks,
            fifo_dropped: fifo.dropped,
            underrun_count: health.underrun_count,
            overflow_samples: health.overflow_samples,
            conversion_errors: self.counters.conversion_errors,
            chunks_per_second,
            fifo_size: fifo.len,
            fifo_bytes: fifo.bytes,
            chunks_received: self.counters.chunks_received,
            chunks_scheduled: self.counters.chunks_scheduled,
            active_sources: self
                .output
                .as_ref()
                .map(|o| o.active_sources_for(self.id))
                .unwrap_or(0),
        }
    }
}

/// Next upstream item, or never when the stream is gone
async fn next_item(upstream: &mut Option<ChunkStream>) -> Option<Result<Vec<u8>>> {
    match upstream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Provider failures keep their original message
fn upstream_message(err: Error) -> String {
    match err {
        Error::Upstream(message) => message,
        other => other.to_string(),
    }
}
