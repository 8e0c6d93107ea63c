//! Frame serialization for the sending side
//!
//! Produces one header message followed by payload fragments, the same
//! message sequence the reassembler expects in message-aligned mode.

use bytes::Bytes;

use crate::constants::MAX_FRAGMENT_SIZE;
use crate::protocol::frame::EncodedFrame;

/// Splits frames into transport messages
#[derive(Debug, Clone, Copy)]
pub struct FrameWriter {
    max_fragment: usize,
}

impl FrameWriter {
    /// `max_fragment` is clamped to at least one byte
    pub fn new(max_fragment: usize) -> Self {
        Self {
            max_fragment: max_fragment.max(1),
        }
    }

    pub fn max_fragment(&self) -> usize {
        self.max_fragment
    }

    /// Header message, then payload slices of at most `max_fragment` bytes
    ///
    /// Payload fragments share the frame's buffer.
    pub fn messages<'a>(&self, frame: &'a EncodedFrame) -> impl Iterator<Item = Bytes> + 'a {
        let header = Bytes::copy_from_slice(&frame.header().encode());
        let step = self.max_fragment;
        let len = frame.payload.len();

        std::iter::once(header).chain(
            (0..len)
                .step_by(step)
                .map(move |start| frame.payload.slice(start..(start + step).min(len))),
        )
    }

    /// Header and payload as one contiguous buffer, for byte-stream transports
    pub fn encode_contiguous(frame: &EncodedFrame) -> Vec<u8> {
        let mut buf = Vec::with_capacity(crate::constants::HEADER_LEN + frame.payload.len());
        buf.extend_from_slice(&frame.header().encode());
        buf.extend_from_slice(&frame.payload);
        buf
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new(MAX_FRAGMENT_SIZE)
    }
}
