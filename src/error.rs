//! Error types for the stream player

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Media error: {0}")]
    Media(#[from] NaluError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire framing errors
///
/// All of these are recoverable: the reassembler discards in-flight state
/// and waits for the next header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated header: {available} of 14 bytes")]
    TruncatedHeader { available: usize },

    #[error("Unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    #[error("Invalid keyframe flag: {0}")]
    InvalidKeyframeFlag(u8),

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    /// The decode path cannot handle this stream; a fallback may take over
    #[error("Unsupported by decoder: {0}")]
    Unsupported(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Timeout")]
    Timeout,
}

/// Annex-B parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NaluError {
    #[error("Stream too short: {0} bytes")]
    TooShort(usize),

    #[error("Stream does not start with a start code")]
    MissingStartCode,

    #[error("No NAL units found")]
    NoNalUnits,
}

/// Audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        AudioError::UnsupportedFormat(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(e: cpal::BuildStreamError) -> Self {
        AudioError::StreamError(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(e: cpal::PlayStreamError) -> Self {
        AudioError::StreamError(e.to_string())
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
