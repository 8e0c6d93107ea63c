//! Stream Player Application
//!
//! Connects to a stream endpoint and plays it back: audio on the local output
//! device, video frames reported to the log.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ws_av_player::{
    audio::{list_output_devices, CpalAudioSink},
    codec::{AlawDecoder, DecodedVideoFrame, DecoderSet},
    config::AppConfig,
    player::{PlaybackController, PlayerEvent},
    sink::VideoSink,
    transport::WebSocketConnector,
};

/// Stands in for a display surface
#[derive(Default)]
struct LoggingVideoSink {
    frames: AtomicU64,
}

impl VideoSink for LoggingVideoSink {
    fn render_frame(&self, frame: DecodedVideoFrame) {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "Render #{}: pts={} {}x{} {:?}",
            n,
            frame.pts,
            frame.width,
            frame.height,
            frame.format
        );
    }
}

fn print_output_devices() {
    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::load_or_default()?;
    match std::env::args().nth(1).as_deref() {
        Some("--list-devices") => {
            print_output_devices();
            return Ok(());
        }
        Some(url) => config.transport.url = url.to_string(),
        None => {}
    }

    tracing::info!("Starting stream player for {}", config.transport.url);

    let audio_sink = Arc::new(CpalAudioSink::new(&config.audio)?);
    let video_sink = Arc::new(LoggingVideoSink::default());

    let controller = PlaybackController::new(
        config.clone(),
        Arc::new(WebSocketConnector::new(config.transport.url.clone())),
        Arc::new(|| DecoderSet::new().with_pcma(AlawDecoder::new())),
        video_sink.clone(),
        audio_sink.clone(),
    );

    let mut events = controller.subscribe();
    controller.play()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }
            _ = stats_interval.tick() => {
                let stats = controller.stats();
                tracing::info!(
                    "Player stats: {} frames, {} protocol errors, video {} rendered / {} late, audio {} played, queues {}/{}",
                    stats.reassembler.frames,
                    stats.reassembler.protocol_errors,
                    stats.sync.video_rendered,
                    stats.sync.video_dropped,
                    stats.sync.audio_played,
                    stats.sync.video_queue_len,
                    stats.sync.audio_queue_len
                );
                let output = audio_sink.stats();
                tracing::info!(
                    "Audio output: {} chunks, {} overflowed, {} underruns, device time {:.1}s",
                    output.chunks_played,
                    output.chunks_overflowed,
                    output.underruns,
                    output.frames_rendered as f64 / audio_sink.sample_rate() as f64
                );
            }
            event = events.recv() => match event {
                Ok(PlayerEvent::TransportClosed) => tracing::info!("Stream ended, draining queued frames"),
                Ok(PlayerEvent::TransportError(e)) => tracing::error!("Transport failed: {}", e),
                Ok(event) => tracing::debug!("Player event: {:?}", event),
                Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} player events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.stop();
    tracing::info!(
        "Rendered {} video frames in total",
        video_sink.frames.load(Ordering::Relaxed)
    );
    Ok(())
}
