//! Frame types and header codec
//!
//! Header layout (big-endian):
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 1    | frame type   |
//! | 1      | 1    | keyframe     |
//! | 2      | 8    | pts          |
//! | 10     | 4    | payload len  |

use bytes::Bytes;
use std::fmt;

use crate::constants::HEADER_LEN;
use crate::error::ProtocolError;

/// Media type carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    H264 = 0x01,
    H265 = 0x02,
    Pcma = 0x04,
}

impl FrameType {
    pub const ALL: [FrameType; 3] = [FrameType::H264, FrameType::H265, FrameType::Pcma];

    pub fn is_video(self) -> bool {
        matches!(self, FrameType::H264 | FrameType::H265)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::H264 => "h264",
            FrameType::H265 => "h265",
            FrameType::Pcma => "pcma",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameType::H264),
            0x02 => Ok(FrameType::H265),
            0x04 => Ok(FrameType::Pcma),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(t: FrameType) -> u8 {
        t as u8
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub is_keyframe: bool,
    pub pts: u64,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parse and validate a header
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let frame_type = FrameType::try_from(buf[0])?;
        let is_keyframe = match buf[1] {
            0 => false,
            1 => true,
            other => return Err(ProtocolError::InvalidKeyframeFlag(other)),
        };

        let mut pts = [0u8; 8];
        pts.copy_from_slice(&buf[2..10]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[10..14]);

        Ok(Self {
            frame_type,
            is_keyframe,
            pts: u64::from_be_bytes(pts),
            payload_len: u32::from_be_bytes(len),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.frame_type.into();
        buf[1] = u8::from(self.is_keyframe);
        buf[2..10].copy_from_slice(&self.pts.to_be_bytes());
        buf[10..14].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }
}

/// A complete encoded media frame
///
/// Immutable once built; the payload is a single owned buffer that moves
/// through the pipeline without being copied.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub frame_type: FrameType,
    pub is_keyframe: bool,
    pub pts: u64,
    pub payload: Bytes,
}

impl EncodedFrame {
    pub fn new(frame_type: FrameType, is_keyframe: bool, pts: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            is_keyframe,
            pts,
            payload: payload.into(),
        }
    }

    /// Header describing this frame
    ///
    /// Payloads longer than `u32::MAX` cannot be framed; callers build frames
    /// from sources that never get near that.
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            frame_type: self.frame_type,
            is_keyframe: self.is_keyframe,
            pts: self.pts,
            payload_len: self.payload.len() as u32,
        }
    }
}

impl fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedFrame")
            .field("frame_type", &self.frame_type)
            .field("is_keyframe", &self.is_keyframe)
            .field("pts", &self.pts)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader {
            frame_type: FrameType::H265,
            is_keyframe: true,
            pts: 0x0102_0304_0506_0708,
            payload_len: 0x0A0B_0C0D,
        };

        let buf = header.encode();
        assert_eq!(
            buf,
            [0x02, 0x01, 1, 2, 3, 4, 5, 6, 7, 8, 0x0A, 0x0B, 0x0C, 0x0D]
        );
        assert_eq!(FrameHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_rejects_unknown_type() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 0x03;
        assert_eq!(
            FrameHeader::decode(&buf),
            Err(ProtocolError::UnknownFrameType(0x03))
        );
    }

    #[test]
    fn test_rejects_bad_keyframe_flag() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 0x01;
        buf[1] = 7;
        assert_eq!(
            FrameHeader::decode(&buf),
            Err(ProtocolError::InvalidKeyframeFlag(7))
        );
    }

    #[test]
    fn test_frame_type_classes() {
        assert!(FrameType::H264.is_video());
        assert!(FrameType::H265.is_video());
        assert!(!FrameType::Pcma.is_video());
        assert_eq!(u8::from(FrameType::Pcma), 0x04);
    }
}
