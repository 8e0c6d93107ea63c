//! Demo Streaming Server
//!
//! Streams `test/test.h264` and `test/test.alaw` (paths configurable) to every
//! WebSocket client of `/ws/test`.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ws_av_player::{config::AppConfig, server::StreamServer};

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
    if let Some(port) = std::env::args().nth(1) {
        config.server.port = port.parse().with_context(|| format!("invalid port: {}", port))?;
    }

    tracing::info!(
        "Serving {} and {} on port {}",
        config.server.video_path.display(),
        config.server.audio_path.display(),
        config.server.port
    );

    let server = StreamServer::new(config.server);
    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
    }
    Ok(())
}
