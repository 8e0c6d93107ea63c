//! Demo streaming server
//!
//! Serves an H.264 file and an A-law file over a WebSocket route, using the
//! same framing the player consumes. Each connection gets its own pair of
//! sources and streams one video frame then one audio frame per step.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;

use crate::config::ServerConfig;
use crate::error::{Result, TransportError};
use crate::media::{AlawFileSource, H264FileSource};
use crate::protocol::{EncodedFrame, FrameWriter};

/// Per-connection streaming statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub messages: u64,
    pub pings: u64,
}

/// HTTP server exposing the demo stream
pub struct StreamServer {
    config: Arc<ServerConfig>,
}

impl StreamServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build the router with the stream endpoint
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .with_state(self.config.clone())
    }

    /// Bind the configured address and serve until the process ends
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind((self.config.bind_address.as_str(), self.config.port)).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "Streaming server listening on ws://{}{}",
            listener.local_addr()?,
            self.config.ws_path
        );
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(config): State<Arc<ServerConfig>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, config))
}

async fn handle_socket(socket: WebSocket, config: Arc<ServerConfig>) {
    let sources = H264FileSource::open(&config.video_path, config.video_frame_interval)
        .and_then(|video| Ok((video, AlawFileSource::open(&config.audio_path, config.audio_chunk_len)?)));
    let (video, audio) = match sources {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!("Failed to open media sources: {}", e);
            let _ = socket.close().await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    // Only watches for the peer going away; client messages are ignored.
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    match stream_frames(&mut sink, video, audio, &config, || reader.is_finished()).await {
        Ok(summary) => tracing::info!(
            "Stream finished: {} video / {} audio frames in {} messages",
            summary.video_frames,
            summary.audio_frames,
            summary.messages
        ),
        Err(e) => tracing::warn!("Stream aborted: {}", e),
    }

    let _ = sink.close().await;
    reader.abort();
}

/// Interleave video and audio frames onto a message sink
///
/// Returns when both sources are exhausted or `peer_gone` reports the client
/// disconnected.
pub async fn stream_frames<S, V, A, F>(
    sink: &mut S,
    mut video: V,
    mut audio: A,
    config: &ServerConfig,
    peer_gone: F,
) -> std::result::Result<StreamSummary, TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    V: Iterator<Item = EncodedFrame>,
    A: Iterator<Item = EncodedFrame>,
    F: Fn() -> bool,
{
    let writer = FrameWriter::new(config.max_fragment);
    let write_timeout = config.write_timeout();
    let mut summary = StreamSummary::default();
    let mut last_ping = Instant::now();

    let mut pace = tokio::time::interval(Duration::from_millis(config.video_frame_interval.max(1)));
    pace.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let (mut video_done, mut audio_done) = (false, false);
    loop {
        if peer_gone() {
            tracing::info!("Client disconnected");
            break;
        }

        if last_ping.elapsed() >= config.ping_interval() {
            send_message(sink, Message::Ping(Vec::new()), write_timeout).await?;
            summary.pings += 1;
            last_ping = Instant::now();
        }

        if !video_done {
            match video.next() {
                Some(frame) => {
                    summary.messages += send_frame(sink, &writer, &frame, write_timeout).await?;
                    summary.video_frames += 1;
                }
                None => {
                    tracing::info!("Video source exhausted");
                    video_done = true;
                }
            }
        }
        if !audio_done {
            match audio.next() {
                Some(frame) => {
                    summary.messages += send_frame(sink, &writer, &frame, write_timeout).await?;
                    summary.audio_frames += 1;
                }
                None => {
                    tracing::info!("Audio source exhausted");
                    audio_done = true;
                }
            }
        }
        if video_done && audio_done {
            break;
        }

        if config.pace {
            pace.tick().await;
        }
    }

    Ok(summary)
}

async fn send_frame<S>(
    sink: &mut S,
    writer: &FrameWriter,
    frame: &EncodedFrame,
    timeout: Duration,
) -> std::result::Result<u64, TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut sent = 0;
    for message in writer.messages(frame) {
        send_message(sink, Message::Binary(message.to_vec()), timeout).await?;
        sent += 1;
    }
    Ok(sent)
}

async fn send_message<S>(sink: &mut S, message: Message, timeout: Duration) -> std::result::Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    tokio::time::timeout(timeout, sink.send(message))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}
