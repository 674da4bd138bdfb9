//! Streaming player: public control surface
//!
//! `StreamingPlayer` is a handle; each `speak()` spawns a session task that
//! owns the processing pipeline until it reaches a terminal state. State and
//! the latest metrics are published on `watch` channels, events on the
//! player's [`EventBus`].
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vocoach_ap::{AudioContext, EngineConfig, MemoryProvider, SpeakOptions, StreamingPlayer};
//! # async fn demo() -> vocoach_ap::Result<()> {
//! let provider = Arc::new(MemoryProvider::new(24_000, vec![vec![0u8; 4800]]));
//! let context = AudioContext::null(16_000);
//! let mut player = StreamingPlayer::new(provider, context, EngineConfig::default())?;
//!
//! let mut events = player.subscribe();
//! player.speak("Hello there", SpeakOptions::default()).await;
//! while let Some(event) = events.recv().await {
//!     if event.is_done() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::context::AudioContext;
use crate::error::{Error, Result};
use crate::playback::pipeline::{Pipeline, PipelineStats};
use crate::playback::session::{Command, Session, SessionParams};
use crate::provider::{SpeakOptions, SpeechProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};
use uuid::Uuid;
use vocoach_common::events::{EventBus, MetricsSnapshot, PlayerState, Subscription};

/// Pending control commands per session
const CONTROL_CHANNEL_CAPACITY: usize = 16;

struct SessionHandle {
    id: Uuid,
    control: mpsc::Sender<Command>,
    abort: Arc<AtomicBool>,
    task: JoinHandle<Pipeline>,
}

pub struct StreamingPlayer {
    provider: Arc<dyn SpeechProvider>,
    context: AudioContext,
    config: Arc<EngineConfig>,
    events: EventBus,
    state_tx: Arc<watch::Sender<PlayerState>>,
    metrics_tx: Arc<watch::Sender<MetricsSnapshot>>,
    /// Held between sessions; owned by the session task while one runs
    pipeline: Option<Pipeline>,
    session: Option<SessionHandle>,
}

impl StreamingPlayer {
    /// Create a player for `provider` on the shared `context`
    ///
    /// # Errors
    /// `Error::Config` if `config` fails validation.
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        context: AudioContext,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(PlayerState::Idle);
        let (metrics_tx, _) = watch::channel(MetricsSnapshot::default());

        Ok(Self {
            provider,
            context,
            events: EventBus::new(config.event_capacity),
            pipeline: Some(Pipeline::new(&config)),
            config: Arc::new(config),
            state_tx: Arc::new(state_tx),
            metrics_tx: Arc::new(metrics_tx),
            session: None,
        })
    }

    /// Start speaking `text`.
    ///
    /// Any session still running is stopped first. Returns the new session
    /// id; progress is reported through events and [`state`](Self::state).
    pub async fn speak(&mut self, text: &str, options: SpeakOptions) -> Uuid {
        self.stop().await;

        let mut pipeline = self
            .pipeline
            .take()
            .unwrap_or_else(|| Pipeline::new(&self.config));
        pipeline.reset();

        let id = Uuid::new_v4();
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let abort = Arc::new(AtomicBool::new(false));

        self.metrics_tx.send_replace(MetricsSnapshot::default());
        let session = Session::new(SessionParams {
            id,
            provider: Arc::clone(&self.provider),
            config: Arc::clone(&self.config),
            events: self.events.clone(),
            state_tx: Arc::clone(&self.state_tx),
            metrics_tx: Arc::clone(&self.metrics_tx),
            control_rx,
            abort: Arc::clone(&abort),
            pipeline,
        });

        info!(
            "Session {} speaking {} chars via {}",
            id,
            text.chars().count(),
            self.provider.name()
        );
        let task = tokio::spawn(session.run(text.to_string(), options, self.context.clone()));

        self.session = Some(SessionHandle {
            id,
            control: control_tx,
            abort,
            task,
        });
        id
    }

    /// Cancel the current session.
    ///
    /// Aborts upstream, clears every buffer and silences this session's
    /// scheduled audio. Returns once the session task has finished. A no-op
    /// when no session exists.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.abort.store(true, Ordering::SeqCst);
        // Fails only if the task already ended
        let _ = session.control.send(Command::Stop).await;
        self.reclaim(session).await;
    }

    /// Wait for the current session to reach a terminal state.
    ///
    /// Cancel-safe: the session handle is kept until its task has finished.
    pub async fn wait(&mut self) -> PlayerState {
        let Some(session) = self.session.as_mut() else {
            return self.state();
        };
        let result = (&mut session.task).await;
        let id = session.id;
        self.session = None;
        self.restore(id, result);
        self.state()
    }

    async fn reclaim(&mut self, mut session: SessionHandle) {
        let result = (&mut session.task).await;
        self.restore(session.id, result);
    }

    fn restore(&mut self, id: Uuid, result: std::result::Result<Pipeline, JoinError>) {
        let pipeline = match result {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Session {} task failed: {}", id, e);
                self.state_tx.send_replace(PlayerState::Error);
                Pipeline::new(&self.config)
            }
        };
        self.pipeline = Some(pipeline);
    }

    /// Suspend playback (Buffering or Playing only)
    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Resume after [`pause`](Self::pause)
    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    fn send(&self, command: Command) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no active session".to_string()))?;
        session
            .control
            .try_send(command)
            .map_err(|e| Error::InvalidState(format!("session not accepting commands: {}", e)))
    }

    /// Set output gain on the shared device, clamped to [0, 2]
    pub async fn set_gain(&self, gain: f32) -> Result<()> {
        self.context.output().await?.set_gain(gain);
        Ok(())
    }

    pub fn state(&self) -> PlayerState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    /// Latest metrics published by the current or last session
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// A session task exists and has not finished
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.task.is_finished())
            .unwrap_or(false)
    }

    /// Pipeline occupancy; `None` while a session owns the pipeline
    pub fn pipeline_stats(&self) -> Option<PipelineStats> {
        self.pipeline.as_ref().map(Pipeline::stats)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }
}
