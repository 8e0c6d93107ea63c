//! # WS A/V Player
//!
//! Low-latency live audio/video playback over a framed byte stream, with
//! audio-clocked lip-sync.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                                 SERVER                                       │
//! │  ┌──────────────────┐                         ┌──────────────────┐           │
//! │  │ H264FileSource   │                         │ AlawFileSource   │           │
//! │  │ (Annex-B AUs)    │                         │ (320 B chunks)   │           │
//! │  └────────┬─────────┘                         └────────┬─────────┘           │
//! │           └────────────────────┬───────────────────────┘                     │
//! │                                ▼                                             │
//! │  ┌─────────────────────────────────────────────────────────────────────┐     │
//! │  │        FrameWriter (protocol::writer) - header + ≤1400 B fragments  │     │
//! │  │        Header: [Type|Key|PTS (u64 BE)|Length (u32 BE)] = 14 bytes   │     │
//! │  └─────────────────────────────────────────────────────────────────────┘     │
//! └────────────────────────────────┼─────────────────────────────────────────────┘
//!                                  │ WebSocket binary messages
//!                                  ▼
//! ┌────────────────────────────────┼─────────────────────────────────────────────┐
//! │                                 PLAYER                                       │
//! │  ┌─────────────────────────────────────────────────────────────────────┐     │
//! │  │  receive task: ChunkStream ─▶ FrameReassembler ─▶ DecodeDispatcher   │     │
//! │  └─────────────────────────────────────────────────────────────────────┘     │
//! │             │                     │                      │                   │
//! │             ▼                     ▼                      ▼                   │
//! │      ┌────────────┐        ┌────────────┐         ┌────────────┐             │
//! │      │decode-h264 │        │decode-h265 │         │decode-pcma │  workers    │
//! │      └─────┬──────┘        └─────┬──────┘         └─────┬──────┘             │
//! │            └─────────────────────┼──────────────────────┘                    │
//! │                                  ▼ DecodeEvent channel (MPSC)                │
//! │  ┌─────────────────────────────────────────────────────────────────────┐     │
//! │  │ Synchronizer: video queue │ audio queue │ PlaybackClock (arm once)  │     │
//! │  └─────────────────────────────────────────────────────────────────────┘     │
//! │                                  │ 10 ms tick: render / drop / wait          │
//! │                     ┌────────────┴────────────┐                              │
//! │                     ▼                         ▼                              │
//! │              ┌────────────┐            ┌────────────┐                        │
//! │              │ VideoSink  │            │ AudioSink  │◀── device clock         │
//! │              └────────────┘            └────────────┘                        │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod media;
pub mod player;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod sync;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Size of the fixed frame header on the wire
    pub const HEADER_LEN: usize = 14;

    /// Largest payload a header may declare before it is treated as corrupt
    pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

    /// Largest payload fragment per transport message
    pub const MAX_FRAGMENT_SIZE: usize = 1400;

    /// Default late tolerance in pts units
    pub const DEFAULT_LATE_THRESHOLD: u64 = 80;

    /// Default early tolerance in pts units
    pub const DEFAULT_EARLY_THRESHOLD: u64 = 30;

    /// Default scheduling tick period
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

    /// Pts units per second (stream pts are milliseconds)
    pub const DEFAULT_CLOCK_RATE: u32 = 1000;

    /// Queue depths (in frames)
    pub const DEFAULT_VIDEO_QUEUE_CAPACITY: usize = 120;
    pub const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 250;

    /// Decoded frames in flight towards the synchronizer
    pub const DEFAULT_COMPLETION_QUEUE_CAPACITY: usize = 256;

    /// G.711 stream format
    pub const PCMA_SAMPLE_RATE: u32 = 8000;
    pub const PCMA_CHANNELS: u16 = 1;

    /// Fade length at chunk edges, in samples
    pub const DEFAULT_FADE_SAMPLES: usize = 50;

    /// Lock-free sample buffer capacity (in chunks)
    pub const DEFAULT_SAMPLE_BUFFER_CHUNKS: usize = 256;

    /// Default HTTP port for the demo server
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default WebSocket route
    pub const DEFAULT_WS_PATH: &str = "/ws/test";

    /// 25 fps in milliseconds
    pub const DEFAULT_VIDEO_FRAME_INTERVAL: u64 = 40;

    /// 40 ms of 8 kHz A-law
    pub const DEFAULT_AUDIO_CHUNK_LEN: usize = 320;

    /// WebSocket keepalive
    pub const DEFAULT_PING_INTERVAL_SECS: u64 = 54;
    pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
}
