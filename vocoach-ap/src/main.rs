//! Vocoach Audio Player (vocoach-ap) - command-line entry point
//!
//! Plays a streamed speech source through the streaming player: either a
//! WAV file delivered in paced chunks or a synthesized test tone. Player
//! events are printed as they happen, optionally as JSON lines.

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vocoach_ap::audio::converter::{pcm16_bytes, to_pcm16};
use vocoach_ap::{
    AppConfig, AudioContext, AudioOutput, MemoryProvider, PlayerEvent, SpeakOptions, SpeechProvider,
    StreamingPlayer, UnderrunStrategy, WavFileProvider,
};
use vocoach_common::config::CONFIG_ENV_VAR;

/// Rate of the synthesized test tone
const TONE_SAMPLE_RATE: u32 = 24_000;

/// Command-line arguments for vocoach-ap
#[derive(Parser, Debug)]
#[command(name = "vocoach-ap")]
#[command(about = "Streaming PCM16 speech player")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// 16-bit mono WAV file to stream (default: synthesized tone)
    #[arg(short, long)]
    wav: Option<PathBuf>,

    /// Text passed to the provider
    #[arg(short, long, default_value = "Hello from vocoach")]
    text: String,

    /// Chunk length delivered by the provider (ms)
    #[arg(long, default_value = "100")]
    chunk_ms: u32,

    /// Delivery speed relative to playback (0 = as fast as possible)
    #[arg(long, default_value = "1.5")]
    realtime_factor: f64,

    /// Vary chunk arrival times to mimic a jittery network
    #[arg(long)]
    jitter: bool,

    /// Length of the synthesized tone (ms)
    #[arg(long, default_value = "3000")]
    tone_ms: u32,

    /// Use the clock-only null output device
    #[arg(long)]
    null_device: bool,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Underrun strategy (pause, silence, repeat)
    #[arg(long)]
    strategy: Option<UnderrunStrategy>,

    /// Pre-buffer threshold (ms)
    #[arg(long)]
    threshold_ms: Option<f64>,

    /// Output gain (0.0 - 2.0)
    #[arg(long)]
    gain: Option<f32>,

    /// Print events as JSON lines
    #[arg(long)]
    json_events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref(), CONFIG_ENV_VAR)
        .context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vocoach_ap={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "vocoach-ap {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if args.list_devices {
        for name in AudioOutput::list_devices().context("Failed to enumerate devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    config.engine.log_summary();
    let provider = build_provider(&args)?;
    let context = AudioContext::new(
        config.output.clone(),
        config.engine.sample_rate,
        config.engine.initial_gain,
    );
    let mut player = StreamingPlayer::new(provider, context, config.engine.clone())
        .context("Failed to create player")?;

    let subscription = player.subscribe();
    let json = args.json_events;
    let printer = tokio::spawn(async move {
        let mut subscription = subscription;
        while let Some(event) = subscription.recv().await {
            print_event(&event, json);
        }
    });

    player.speak(&args.text, SpeakOptions::default()).await;

    let interrupted = tokio::select! {
        _ = player.wait() => false,
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            true
        }
    };
    if interrupted {
        info!("Received Ctrl+C, stopping");
        player.stop().await;
    }

    let state = player.state();
    let metrics = player.metrics();
    // Dropping the player closes the event bus and ends the printer
    drop(player);
    if let Err(e) = printer.await {
        warn!("Event printer task failed: {}", e);
    }

    info!(
        "Finished in state {}: {} chunks, {} underruns, first sound {}",
        state,
        metrics.chunks_received,
        metrics.underrun_count,
        metrics
            .first_sound_latency_ms
            .map(|ms| format!("{:.0}ms", ms))
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if args.null_device {
        config.output.null_device = true;
    }
    if let Some(device) = &args.device {
        config.output.device = Some(device.clone());
    }
    if let Some(strategy) = args.strategy {
        config.engine.underrun_strategy = strategy;
    }
    if let Some(threshold) = args.threshold_ms {
        config.engine.pre_buffer_threshold_ms = threshold;
    }
    if let Some(gain) = args.gain {
        config.engine.initial_gain = gain;
    }
}

fn build_provider(args: &Args) -> Result<Arc<dyn SpeechProvider>> {
    if let Some(path) = &args.wav {
        let provider = WavFileProvider::open(path, args.chunk_ms)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .with_realtime_factor(args.realtime_factor)
            .with_jitter(args.jitter);
        info!(
            "Streaming {} ({:.1}s)",
            provider.path().display(),
            provider.duration().as_secs_f64()
        );
        return Ok(Arc::new(provider));
    }

    let chunks = tone_chunks(args.tone_ms, args.chunk_ms);
    let mut provider = MemoryProvider::new(TONE_SAMPLE_RATE, chunks).with_name("tone");
    if args.realtime_factor > 0.0 {
        let interval = args.chunk_ms as f64 / 1000.0 / args.realtime_factor;
        provider = provider.with_interval(Duration::from_secs_f64(interval));
    }
    Ok(Arc::new(provider))
}

/// 220 Hz tone with a gentle 3 Hz amplitude wobble, as PCM16 chunks
fn tone_chunks(total_ms: u32, chunk_ms: u32) -> Vec<Vec<u8>> {
    let total = (TONE_SAMPLE_RATE as u64 * total_ms as u64 / 1000) as usize;
    let per_chunk = ((TONE_SAMPLE_RATE as u64 * chunk_ms.max(1) as u64) / 1000).max(1) as usize;
    let rate = TONE_SAMPLE_RATE as f32;

    let samples: Vec<f32> = (0..total)
        .map(|i| {
            let t = i as f32 / rate;
            let envelope = 0.6 + 0.2 * (TAU * 3.0 * t).sin();
            0.5 * envelope * (TAU * 220.0 * t).sin()
        })
        .collect();

    samples
        .chunks(per_chunk)
        .map(|chunk| pcm16_bytes(&to_pcm16(chunk)))
        .collect()
}

fn print_event(event: &PlayerEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    match event {
        PlayerEvent::Playing { metrics, .. } => println!(
            "[playing] {:.0}ms buffered ({:.0}%)",
            metrics.buffer_duration_ms, metrics.buffer_percent
        ),
        PlayerEvent::Underrun { metrics, .. } => println!(
            "[underrun] #{} with {:.0}ms buffered",
            metrics.underrun_count, metrics.buffer_duration_ms
        ),
        PlayerEvent::Metrics { metrics, .. } => println!(
            "[metrics] buffer {:.0}ms, fifo {}, received {}, scheduled {}",
            metrics.buffer_duration_ms,
            metrics.fifo_size,
            metrics.chunks_received,
            metrics.chunks_scheduled
        ),
        PlayerEvent::Done { reason, .. } => println!("[done] {:?}", reason),
        PlayerEvent::Error { kind, message, .. } => println!("[error] {:?}: {}", kind, message),
        PlayerEvent::StateChanged { .. } => {}
        other => println!("[{}]", other.name()),
    }
}
