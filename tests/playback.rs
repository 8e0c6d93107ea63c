//! End-to-end playback through the controller with in-memory and WebSocket
//! transports.

use bytes::Bytes;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use ws_av_player::codec::{
    AlawDecoder, DecodedAudioFrame, DecodedVideoFrame, DecoderSet, PixelFormat, VideoDecoder,
};
use ws_av_player::config::AppConfig;
use ws_av_player::error::{CodecError, TransportError};
use ws_av_player::player::{PlaybackController, PlaybackState, PlayerEvent};
use ws_av_player::protocol::{EncodedFrame, FrameType, FrameWriter};
use ws_av_player::server::StreamServer;
use ws_av_player::sink::{AudioSink, VideoSink};
use ws_av_player::transport::{Connector, MemoryConnector, WebSocketConnector};

/// Emits one tiny picture per payload
struct StubVideoDecoder;

impl VideoDecoder for StubVideoDecoder {
    fn decode(&mut self, payload: &[u8], pts: u64, _is_keyframe: bool) -> Result<Vec<DecodedVideoFrame>, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::InvalidPayload("empty access unit".into()));
        }
        Ok(vec![DecodedVideoFrame {
            pts,
            width: 2,
            height: 2,
            format: PixelFormat::I420,
            pixels: vec![0; 6],
        }])
    }
}

#[derive(Default)]
struct RecordingVideo {
    rendered: Mutex<Vec<u64>>,
}

impl VideoSink for RecordingVideo {
    fn render_frame(&self, frame: DecodedVideoFrame) {
        self.rendered.lock().push(frame.pts);
    }
}

/// Wall-clock audio sink that does not schedule on its own
struct RecordingAudio {
    start: Instant,
    played: Mutex<Vec<u64>>,
    volume: Mutex<f32>,
}

impl RecordingAudio {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            played: Mutex::new(Vec::new()),
            volume: Mutex::new(1.0),
        }
    }
}

impl AudioSink for RecordingAudio {
    fn play(&self, frame: DecodedAudioFrame) {
        self.played.lock().push(frame.pts);
    }

    fn current_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn set_volume(&self, level: f32) {
        *self.volume.lock() = level;
    }
}

fn encode(frames: &[EncodedFrame]) -> Vec<Bytes> {
    let writer = FrameWriter::default();
    frames.iter().flat_map(|f| writer.messages(f).collect::<Vec<_>>()).collect()
}

/// Audio and video interleaved, `count` frames each, 40 ms apart
fn av_stream(count: u64) -> Vec<EncodedFrame> {
    (1..=count)
        .flat_map(|i| {
            [
                EncodedFrame::new(FrameType::H264, i == 1, i * 40, vec![0x65; 3000]),
                EncodedFrame::new(FrameType::Pcma, false, i * 40, vec![0xD5; 320]),
            ]
        })
        .collect()
}

struct Harness {
    controller: PlaybackController,
    video: Arc<RecordingVideo>,
    audio: Arc<RecordingAudio>,
}

fn harness(connector: Arc<dyn Connector>, config: AppConfig) -> Harness {
    let video = Arc::new(RecordingVideo::default());
    let audio = Arc::new(RecordingAudio::new());
    let controller = PlaybackController::new(
        config,
        connector,
        Arc::new(|| {
            DecoderSet::new()
                .with_h264(StubVideoDecoder)
                .with_pcma(AlawDecoder::new())
        }),
        video.clone(),
        audio.clone(),
    );
    Harness { controller, video, audio }
}

async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

async fn next_matching(
    events: &mut broadcast::Receiver<PlayerEvent>,
    pred: impl Fn(&PlayerEvent) -> bool,
) -> Option<PlayerEvent> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plays_stream_in_pts_order() {
    let connector = Arc::new(MemoryConnector::new(encode(&av_stream(10))));
    let h = harness(connector, AppConfig::default());

    h.controller.play().unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Playing);

    let video = h.video.clone();
    assert!(wait_until(Duration::from_secs(3), || video.rendered.lock().len() == 10).await);

    let rendered = h.video.rendered.lock().clone();
    assert_eq!(rendered, (1..=10).map(|i| i * 40).collect::<Vec<_>>());
    assert!(!h.audio.played.lock().is_empty());

    let clock = h.controller.synchronizer().unwrap().clock().unwrap();
    assert_eq!(clock.origin_pts, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_drains_without_rendering() {
    let mut frames = vec![EncodedFrame::new(FrameType::Pcma, false, 0, vec![0xD5; 320])];
    frames.extend((1..=100).map(|pts| EncodedFrame::new(FrameType::H264, pts == 1, pts, vec![1; 64])));

    let h = harness(Arc::new(MemoryConnector::new(encode(&frames)).hold_open()), AppConfig::default());
    h.controller.play().unwrap();
    h.controller.pause();
    assert_eq!(*h.audio.volume.lock(), 0.0);

    let sync = h.controller.synchronizer().unwrap();
    let probe = sync.clone();
    assert!(wait_until(Duration::from_secs(3), || probe.stats().video_skipped == 100).await);

    assert!(h.video.rendered.lock().is_empty());
    assert!(sync.video_queue().is_empty());
    assert_eq!(h.controller.state(), PlaybackState::Paused);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_protocol_error_is_reported_and_skipped() {
    let mut chunks = encode(&av_stream(2));
    // Lands between the first video frame and the first audio header.
    chunks.insert(4, Bytes::from_static(&[0x09, 0x00]));

    let h = harness(Arc::new(MemoryConnector::new(chunks)), AppConfig::default());
    let mut events = h.controller.subscribe();
    h.controller.play().unwrap();

    let event = next_matching(&mut events, |e| matches!(e, PlayerEvent::ProtocolError(_))).await;
    assert!(event.is_some());
    assert!(next_matching(&mut events, |e| *e == PlayerEvent::TransportClosed).await.is_some());

    let stats = h.controller.stats();
    assert_eq!(stats.reassembler.protocol_errors, 1);
    assert_eq!(stats.reassembler.frames, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transport_error_keeps_draining() {
    let connector = MemoryConnector::new(encode(&av_stream(5))).with_error(TransportError::ReceiveFailed("reset".into()));
    let h = harness(Arc::new(connector), AppConfig::default());
    let mut events = h.controller.subscribe();
    h.controller.play().unwrap();

    assert!(next_matching(&mut events, |e| matches!(e, PlayerEvent::TransportError(_))).await.is_some());

    let video = h.video.clone();
    assert!(wait_until(Duration::from_secs(3), || video.rendered.lock().len() == 5).await);
    assert_eq!(h.controller.state(), PlaybackState::Playing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_discards_session() {
    let connector = Arc::new(MemoryConnector::new(encode(&av_stream(50))).hold_open());
    let h = harness(connector, AppConfig::default());

    h.controller.play().unwrap();
    let first = h.controller.session_id().unwrap();
    let sync = h.controller.synchronizer().unwrap();
    let probe = sync.clone();
    assert!(wait_until(Duration::from_secs(2), || probe.is_armed()).await);

    h.controller.stop();
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert!(sync.is_closed());
    assert!(sync.video_queue().is_empty());
    assert!(sync.audio_queue().is_empty());

    h.controller.play().unwrap();
    let second = h.controller.session_id().unwrap();
    assert_ne!(first, second);
    assert!(!h.controller.synchronizer().unwrap().is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_failure_is_reported() {
    let connector = MemoryConnector::refusing(TransportError::ConnectionFailed("refused".into()));
    let h = harness(Arc::new(connector), AppConfig::default());
    let mut events = h.controller.subscribe();
    h.controller.play().unwrap();

    let event = next_matching(&mut events, |e| matches!(e, PlayerEvent::TransportError(_))).await;
    assert_eq!(
        event,
        Some(PlayerEvent::TransportError(TransportError::ConnectionFailed("refused".into())))
    );
    assert_eq!(h.controller.state(), PlaybackState::Playing);
}

fn annex_b(frames: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for nalu in [&[0x67u8, 0x42, 0x00][..], &[0x68, 0xCE, 0x38]] {
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(nalu);
    }
    for i in 0..frames {
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(if i == 0 { &[0x65, 0x88, 0x80] } else { &[0x41, 0x9A, 0x02] });
    }
    data
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_websocket_end_to_end() {
    let mut video_file = tempfile::NamedTempFile::new().unwrap();
    video_file.write_all(&annex_b(8)).unwrap();
    let mut audio_file = tempfile::NamedTempFile::new().unwrap();
    audio_file.write_all(&[0xD5; 320 * 8]).unwrap();

    let mut config = AppConfig::default();
    config.server.video_path = video_file.path().to_path_buf();
    config.server.audio_path = audio_file.path().to_path_buf();
    config.server.pace = false;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = StreamServer::new(config.server.clone());
    tokio::spawn(server.serve_on(listener));

    let url = format!("ws://{}{}", addr, config.server.ws_path);
    let h = harness(Arc::new(WebSocketConnector::new(url)), config);
    h.controller.play().unwrap();

    let video = h.video.clone();
    assert!(wait_until(Duration::from_secs(5), || video.rendered.lock().len() == 8).await);
    assert_eq!(*h.video.rendered.lock(), (1..=8).map(|i| i * 40).collect::<Vec<_>>());

    assert!(wait_until(Duration::from_secs(2), || h.controller.stats().reassembler.frames == 16).await);
    assert_eq!(h.controller.stats().reassembler.protocol_errors, 0);
}
