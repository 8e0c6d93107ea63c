//! Application configuration
//!
//! Every section has sensible defaults, so a TOML file only needs to name the
//! values it overrides:
//!
//! ```toml
//! [transport]
//! url = "ws://192.168.1.20:8080/ws/test"
//!
//! [sync]
//! late_threshold = 120
//! audio_policy = "drain"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::FramingMode;
use crate::sync::{AudioPolicy, OverflowPolicy};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub sync: SyncConfig,
    pub decode: DecodeConfig,
    pub audio: AudioOutputConfig,
    pub server: ServerConfig,
}

/// Client-side transport and framing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Stream endpoint
    pub url: String,
    /// How chunk boundaries relate to frame boundaries
    pub framing: FramingMode,
    /// Largest payload a header may declare
    pub max_payload_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{}{}", DEFAULT_HTTP_PORT, DEFAULT_WS_PATH),
            framing: FramingMode::MessageAligned,
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }
}

/// Playback synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Frames older than `current - late_threshold` are dropped (pts units)
    pub late_threshold: u64,
    /// Frames up to `current + early_threshold` are rendered (pts units)
    pub early_threshold: u64,
    /// Scheduling tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Pts units per second of device clock
    pub clock_rate: u32,
    pub audio_policy: AudioPolicy,
    pub video_queue_capacity: usize,
    pub audio_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            late_threshold: DEFAULT_LATE_THRESHOLD,
            early_threshold: DEFAULT_EARLY_THRESHOLD,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            clock_rate: DEFAULT_CLOCK_RATE,
            audio_policy: AudioPolicy::Auto,
            video_queue_capacity: DEFAULT_VIDEO_QUEUE_CAPACITY,
            audio_queue_capacity: DEFAULT_AUDIO_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

impl SyncConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Decode boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Decoded frames in flight between workers and the synchronizer;
    /// workers wait when it is full
    pub completion_queue_capacity: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            completion_queue_capacity: DEFAULT_COMPLETION_QUEUE_CAPACITY,
        }
    }
}

/// PCM output device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOutputConfig {
    /// Output device name, `None` for the system default
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Fade length applied at both ends of every chunk
    pub fade_samples: usize,
    /// Chunks buffered ahead of the device callback
    pub buffer_chunks: usize,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: PCMA_SAMPLE_RATE,
            channels: PCMA_CHANNELS,
            fade_samples: DEFAULT_FADE_SAMPLES,
            buffer_chunks: DEFAULT_SAMPLE_BUFFER_CHUNKS,
        }
    }
}

/// Demo streaming server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub ws_path: String,
    /// Annex-B H.264 elementary stream
    pub video_path: PathBuf,
    /// Raw G.711 A-law samples
    pub audio_path: PathBuf,
    /// Largest payload fragment per WebSocket message
    pub max_fragment: usize,
    /// Pts step between video frames (milliseconds)
    pub video_frame_interval: u64,
    /// Bytes of A-law per audio frame
    pub audio_chunk_len: usize,
    /// Send frames in real time instead of as fast as possible
    pub pace: bool,
    pub ping_interval_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_HTTP_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            video_path: PathBuf::from("test/test.h264"),
            audio_path: PathBuf::from("test/test.alaw"),
            max_fragment: MAX_FRAGMENT_SIZE,
            video_frame_interval: DEFAULT_VIDEO_FRAME_INTERVAL,
            audio_chunk_len: DEFAULT_AUDIO_CHUNK_LEN,
            pace: true,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ws-av-player")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the per-user config file, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 9] = [
            (self.transport.max_payload_len == 0, "transport.max_payload_len must be > 0"),
            (self.sync.tick_interval_ms == 0, "sync.tick_interval_ms must be > 0"),
            (self.sync.clock_rate == 0, "sync.clock_rate must be > 0"),
            (self.sync.video_queue_capacity == 0, "sync.video_queue_capacity must be > 0"),
            (self.sync.audio_queue_capacity == 0, "sync.audio_queue_capacity must be > 0"),
            (
                self.decode.completion_queue_capacity == 0,
                "decode.completion_queue_capacity must be > 0",
            ),
            (
                self.audio.sample_rate == 0 || self.audio.channels == 0,
                "audio.sample_rate and audio.channels must be > 0",
            ),
            (self.server.max_fragment == 0, "server.max_fragment must be > 0"),
            (self.server.audio_chunk_len == 0, "server.audio_chunk_len must be > 0"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(Error::Config((*msg).to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.late_threshold, 80);
        assert_eq!(config.sync.early_threshold, 30);
        assert_eq!(config.sync.tick_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [sync]
            late_threshold = 120
            audio_policy = "drain"
            overflow_policy = "drop_newest"

            [transport]
            framing = "byte_stream"
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.late_threshold, 120);
        assert_eq!(config.sync.early_threshold, 30);
        assert_eq!(config.sync.audio_policy, AudioPolicy::Drain);
        assert_eq!(config.sync.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.transport.framing, FramingMode::ByteStream);
        assert_eq!(config.server.max_fragment, 1400);
    }

    #[test]
    fn test_rejects_zero_tick() {
        let err = AppConfig::from_toml_str("[sync]\ntick_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9000\npace = false").unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(!config.server.pace);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }
}
