//! Decode boundary
//!
//! The actual H.264/H.265 decoders live outside this crate and plug in through
//! [`VideoDecoder`]; G.711 A-law ships built in. The dispatcher runs every
//! decoder on its own worker thread and reports results over a channel.

pub mod alaw;
pub mod dispatcher;
pub mod fallback;

pub use alaw::AlawDecoder;
pub use dispatcher::{completion_channel, DecodeDispatcher, DecodeEvent, DispatchOutcome, DispatchStats};
pub use fallback::FallbackVideoDecoder;

use crate::error::CodecError;
use crate::protocol::FrameType;

/// Pixel layout of a decoded picture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, planes packed Y then U then V
    I420,
    /// Packed 8-bit RGBA
    Rgba,
}

/// A decoded picture, owned by the synchronizer once queued
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedVideoFrame {
    pub pts: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl DecodedVideoFrame {
    /// Buffer size implied by format and dimensions
    pub fn expected_len(&self) -> usize {
        let (luma, chroma) = self.plane_sizes();
        match self.format {
            PixelFormat::I420 => luma + 2 * chroma,
            PixelFormat::Rgba => luma,
        }
    }

    /// Length of the first plane and of each chroma plane
    ///
    /// RGBA has a single plane and reports zero chroma.
    pub fn plane_sizes(&self) -> (usize, usize) {
        let (w, h) = (self.width as usize, self.height as usize);
        match self.format {
            PixelFormat::I420 => (w * h, (w / 2) * (h / 2)),
            PixelFormat::Rgba => (w * h * 4, 0),
        }
    }
}

impl std::fmt::Debug for DecodedVideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedVideoFrame")
            .field("pts", &self.pts)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Decoded 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudioFrame {
    pub pts: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved signed 16-bit samples
    pub samples: Vec<i16>,
}

impl DecodedAudioFrame {
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback duration in microseconds
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples_per_channel() as u64 * 1_000_000) / self.sample_rate as u64
    }
}

/// External video decoder
///
/// May return no frames, e.g. for delta frames before the first keyframe.
/// Errors are reported per frame and never end the session.
pub trait VideoDecoder: Send {
    fn decode(
        &mut self,
        payload: &[u8],
        pts: u64,
        is_keyframe: bool,
    ) -> Result<Vec<DecodedVideoFrame>, CodecError>;

    fn name(&self) -> &str {
        "video"
    }
}

/// External audio decoder
pub trait AudioDecoder: Send {
    fn decode(&mut self, payload: &[u8], pts: u64) -> Result<Vec<DecodedAudioFrame>, CodecError>;

    fn name(&self) -> &str {
        "audio"
    }
}

/// The decoders available to one session
///
/// Missing entries are allowed; frames of that type are dropped.
#[derive(Default)]
pub struct DecoderSet {
    pub h264: Option<Box<dyn VideoDecoder>>,
    pub h265: Option<Box<dyn VideoDecoder>>,
    pub pcma: Option<Box<dyn AudioDecoder>>,
}

impl DecoderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_h264(mut self, decoder: impl VideoDecoder + 'static) -> Self {
        self.h264 = Some(Box::new(decoder));
        self
    }

    pub fn with_h265(mut self, decoder: impl VideoDecoder + 'static) -> Self {
        self.h265 = Some(Box::new(decoder));
        self
    }

    pub fn with_pcma(mut self, decoder: impl AudioDecoder + 'static) -> Self {
        self.pcma = Some(Box::new(decoder));
        self
    }

    pub fn has(&self, frame_type: FrameType) -> bool {
        match frame_type {
            FrameType::H264 => self.h264.is_some(),
            FrameType::H265 => self.h265.is_some(),
            FrameType::Pcma => self.pcma.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i420_plane_sizes() {
        let frame = DecodedVideoFrame {
            pts: 0,
            width: 640,
            height: 480,
            format: PixelFormat::I420,
            pixels: Vec::new(),
        };
        assert_eq!(frame.plane_sizes(), (307_200, 76_800));
        assert_eq!(frame.expected_len(), 460_800);
    }

    #[test]
    fn test_audio_duration() {
        let frame = DecodedAudioFrame {
            pts: 0,
            sample_rate: 8000,
            channels: 1,
            samples: vec![0; 320],
        };
        assert_eq!(frame.duration_us(), 40_000);
    }

    #[test]
    fn test_decoder_set_presence() {
        let set = DecoderSet::new().with_pcma(AlawDecoder::new());
        assert!(set.has(FrameType::Pcma));
        assert!(!set.has(FrameType::H264));
    }
}
