//! Audio output device with absolute-time scheduling
//!
//! Wraps either a cpal output stream or a clock-only null device behind one
//! interface: create a buffer, schedule it at a device time, watch the clock
//! and count active sources.
//!
//! **Threading:** a cpal `Stream` is not `Send`, so the stream is built and
//! kept alive on a dedicated thread. The session task and the callback
//! share the timeline and the error flag through `Arc`s.
//!
//! **Pausing:** the device clock always runs. A session pauses by holding
//! its own sources on the timeline, so other sessions on the same output
//! are unaffected.
//!
//! **Recovery:** the stream error callback marks the output invalid. Owners
//! check [`AudioOutput::is_valid`] and open a fresh device when it is false.

use crate::audio::converter::resample;
use crate::audio::timeline::{ScheduledSpan, Timeline};
use crate::audio::types::PlayableBuffer;
use crate::config::OutputConfig;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long to wait for the device thread to report the opened stream
const DEVICE_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Device thread keep-alive poll period
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(100);

/// Audio output handle.
///
/// Shared by reference count between the context and the session using it.
pub struct AudioOutput {
    timeline: Arc<Mutex<Timeline>>,
    /// Stream error flag, set by the audio callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
    sample_rate: u32,
    channels: u16,
    device_name: String,
    backend: Backend,
}

enum Backend {
    Device(DeviceThread),
    Null(Mutex<NullClock>),
}

struct DeviceThread {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Wall-clock driven frame counter for the null device
struct NullClock {
    started: Instant,
}

impl NullClock {
    fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What the device thread reports back once the stream is running
struct OpenedDevice {
    name: String,
    sample_rate: u32,
    channels: u16,
    timeline: Arc<Mutex<Timeline>>,
}

impl AudioOutput {
    /// Open the output described by `config`.
    ///
    /// # Arguments
    /// - `config`: device selection (`null_device` skips hardware entirely)
    /// - `preferred_rate`: rate to request from the device (pipeline rate)
    /// - `gain`: initial gain, clamped to [0, 2]
    pub fn open(config: &OutputConfig, preferred_rate: u32, gain: f32) -> Result<Self> {
        if config.null_device {
            let rate = config.null_sample_rate.unwrap_or(preferred_rate);
            return Ok(Self::null(rate, gain));
        }
        Self::open_device(config.device.clone(), config.buffer_size, preferred_rate, gain)
    }

    /// Clock-only output: nothing is heard, but scheduling, the clock and
    /// source lifetimes behave as on hardware.
    pub fn null(sample_rate: u32, gain: f32) -> Self {
        info!("Using null audio output at {}Hz", sample_rate);
        Self {
            timeline: Arc::new(Mutex::new(Timeline::new(sample_rate, gain))),
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
            sample_rate: sample_rate.max(1),
            channels: 1,
            device_name: "null".to_string(),
            backend: Backend::Null(Mutex::new(NullClock::new())),
        }
    }

    /// Open a cpal device, hosting its stream on a dedicated thread
    pub fn open_device(
        device_name: Option<String>,
        buffer_size: Option<u32>,
        preferred_rate: u32,
        gain: f32,
    ) -> Result<Self> {
        let error_flag = Arc::new(AtomicBool::new(false));
        let error_count = Arc::new(AtomicU32::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<OpenedDevice>>();

        let thread_error_flag = Arc::clone(&error_flag);
        let thread_error_count = Arc::clone(&error_count);
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("vocoach-audio-out".to_string())
            .spawn(move || {
                let opened = start_stream(
                    device_name,
                    buffer_size,
                    preferred_rate,
                    gain,
                    thread_error_flag,
                    thread_error_count,
                );
                let stream = match opened {
                    Ok((stream, device)) => {
                        if ready_tx.send(Ok(device)).is_err() {
                            return;
                        }
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until the owning AudioOutput drops
                while !thread_shutdown.load(Ordering::Relaxed) {
                    thread::sleep(KEEPALIVE_INTERVAL);
                }
                drop(stream);
                debug!("Audio output thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let device = ready_rx
            .recv_timeout(DEVICE_OPEN_TIMEOUT)
            .map_err(|e| Error::AudioOutput(format!("Audio device did not start: {}", e)))??;

        info!(
            "Audio output ready: {} ({}Hz, {} channels)",
            device.name, device.sample_rate, device.channels
        );

        Ok(Self {
            timeline: device.timeline,
            error_flag,
            error_count,
            sample_rate: device.sample_rate,
            channels: device.channels,
            device_name: device.name,
            backend: Backend::Device(DeviceThread {
                shutdown,
                handle: Some(handle),
            }),
        })
    }

    /// List available output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the null device clock up to wall time
    fn sync_clock(&self) {
        if let Backend::Null(clock) = &self.backend {
            let elapsed = clock.lock().unwrap_or_else(PoisonError::into_inner).elapsed();
            let frame = (elapsed.as_secs_f64() * self.sample_rate as f64).floor() as u64;
            self.timeline().advance_to(frame);
        }
    }

    /// Wrap mono samples at `sample_rate` as a schedulable buffer.
    ///
    /// Samples are converted to the device rate here, so scheduling never
    /// resamples.
    pub fn create_buffer(&self, samples: Vec<f32>, sample_rate: u32) -> PlayableBuffer {
        if sample_rate == self.sample_rate {
            return PlayableBuffer::new(samples.into(), sample_rate);
        }
        let converted = resample(&samples, sample_rate, self.sample_rate);
        PlayableBuffer::new(converted.into(), self.sample_rate)
    }

    /// Schedule `buffer` to start at device time `at_time` (seconds).
    ///
    /// `owner` tags the source so one session can cancel or count its own
    /// buffers on a shared device.
    pub fn schedule_buffer(
        &self,
        owner: Uuid,
        buffer: &PlayableBuffer,
        at_time: f64,
    ) -> Result<ScheduledSpan> {
        if !self.is_valid() {
            return Err(Error::AudioOutput(format!(
                "Output '{}' is no longer valid",
                self.device_name
            )));
        }
        if buffer.sample_rate() != self.sample_rate {
            return Err(Error::AudioOutput(format!(
                "Buffer rate {}Hz does not match device rate {}Hz",
                buffer.sample_rate(),
                self.sample_rate
            )));
        }

        self.sync_clock();
        let span = self
            .timeline()
            .schedule(owner, Arc::clone(&buffer.samples), at_time);
        debug!(
            "Scheduled source {:?} at {:.3}s for {:.3}s",
            span.id, span.start_time, span.duration
        );
        Ok(span)
    }

    /// Device clock in seconds since the output opened
    pub fn current_time(&self) -> f64 {
        self.sync_clock();
        self.timeline().now()
    }

    /// Sources scheduled and not yet finished
    pub fn active_sources(&self) -> usize {
        self.sync_clock();
        let mut timeline = self.timeline();
        timeline.retire();
        timeline.active_sources()
    }

    /// Sources of `owner` scheduled and not yet finished
    pub fn active_sources_for(&self, owner: Uuid) -> usize {
        self.sync_clock();
        let mut timeline = self.timeline();
        timeline.retire();
        timeline.active_sources_for(owner)
    }

    /// Cancel pending and playing sources of one owner
    pub fn cancel_owner(&self, owner: Uuid) -> usize {
        let cancelled = self.timeline().cancel_owner(owner);
        if cancelled > 0 {
            debug!("Cancelled {} sources", cancelled);
        }
        cancelled
    }

    /// Pause one owner: its sources stop rendering and hold their positions
    pub fn hold(&self, owner: Uuid) {
        self.sync_clock();
        if self.timeline().hold(owner) {
            debug!("Holding sources of {}", owner);
        }
    }

    /// Resume a held owner.
    ///
    /// Returns how far (seconds) its sources moved later on the device clock.
    pub fn release(&self, owner: Uuid) -> f64 {
        self.sync_clock();
        let shift = self.timeline().release(owner);
        if shift > 0.0 {
            debug!("Released sources of {} after {:.3}s", owner, shift);
        }
        shift
    }

    pub fn is_held(&self, owner: Uuid) -> bool {
        self.timeline().is_held(owner)
    }

    /// Set output gain, clamped to [0, 2]
    pub fn set_gain(&self, gain: f32) {
        let applied = self.timeline().set_gain(gain);
        debug!("Gain set to {:.2}", applied);
    }

    pub fn gain(&self) -> f32 {
        self.timeline().gain()
    }

    /// False once the stream reported an error; open a new output to recover
    pub fn is_valid(&self) -> bool {
        !self.error_flag.load(Ordering::SeqCst)
    }

    /// Mark the output unusable (stream error or forced teardown)
    pub fn invalidate(&self) {
        self.error_flag.store(true, Ordering::SeqCst);
        self.error_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Recent scheduled spans, oldest first
    pub fn scheduled_history(&self) -> Vec<ScheduledSpan> {
        self.timeline().history()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_null(&self) -> bool {
        matches!(self.backend, Backend::Null(_))
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if let Backend::Device(device) = &mut self.backend {
            device.shutdown.store(true, Ordering::Relaxed);
            if let Some(handle) = device.handle.take() {
                if handle.join().is_err() {
                    warn!("Audio output thread panicked");
                }
            }
        }
    }
}

/// Runs on the device thread: find the device, build and start the stream
fn start_stream(
    device_name: Option<String>,
    buffer_size: Option<u32>,
    preferred_rate: u32,
    gain: f32,
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
) -> Result<(cpal::Stream, OpenedDevice)> {
    let host = cpal::default_host();

    let device = match device_name.as_ref() {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
            match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                Some(dev) => dev,
                None => {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                    host.default_output_device().ok_or_else(|| {
                        Error::AudioOutput(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
    };
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (mut config, sample_format) = best_config(&device, preferred_rate)?;
    if let Some(size) = buffer_size {
        config.buffer_size = cpal::BufferSize::Fixed(size);
    }
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        config.sample_rate.0, config.channels, sample_format, config.buffer_size
    );

    let timeline = Arc::new(Mutex::new(Timeline::new(config.sample_rate.0, gain)));
    let callback_state = CallbackState {
        timeline: Arc::clone(&timeline),
        error_flag,
        error_count,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, callback_state)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, callback_state)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, callback_state)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, callback_state)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((
        stream,
        OpenedDevice {
            name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            timeline,
        },
    ))
}

/// Prefer an f32 config at the pipeline rate, else the device default
fn best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
        .find(|config| {
            config.channels() <= 2
                && config.min_sample_rate().0 <= preferred_rate
                && config.max_sample_rate().0 >= preferred_rate
                && config.sample_format() == SampleFormat::F32
        });

    if let Some(config) = supported {
        let sample_format = config.sample_format();
        return Ok((
            config.with_sample_rate(cpal::SampleRate(preferred_rate)).config(),
            sample_format,
        ));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    debug!(
        "Device does not support {}Hz f32, using default {}Hz {:?}",
        preferred_rate,
        default.sample_rate().0,
        default.sample_format()
    );
    Ok((default.config(), default.sample_format()))
}

struct CallbackState {
    timeline: Arc<Mutex<Timeline>>,
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    state: CallbackState,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let CallbackState {
        timeline,
        error_flag,
        error_count,
    } = state;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut timeline = timeline.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample(timeline.render_frame());
                    frame.fill(value);
                }
                timeline.retire();
            },
            move |err| {
                error!("Audio stream error: {} - marking output invalid", err);
                error_flag.store(true, Ordering::SeqCst);
                error_count.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
