//! Frame reassembly from transport chunks
//!
//! Transport chunk boundaries do not line up with frame boundaries: a payload
//! usually arrives as many fragments, and one chunk may carry the tail of one
//! frame together with the start of the next. The reassembler is a small
//! state machine that alternates between collecting a header and collecting
//! exactly the payload length that header declared.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::constants::{HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::error::ProtocolError;
use crate::protocol::frame::{EncodedFrame, FrameHeader};

/// How transport chunks relate to header boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Message-oriented transport (WebSocket): a header is never split, so a
    /// chunk starting a header must hold all 14 bytes of it.
    #[default]
    MessageAligned,
    /// Plain byte stream: header bytes may be split anywhere.
    ByteStream,
}

/// Where the state machine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblerState {
    /// Waiting for (the rest of) a header; `have` bytes already buffered
    AwaitingHeader { have: usize },
    /// Collecting payload bytes
    AwaitingPayload { got: usize, len: usize },
}

/// Frame currently being filled
struct Pending {
    header: FrameHeader,
    payload: BytesMut,
}

impl Pending {
    fn remaining(&self) -> usize {
        self.header.payload_len as usize - self.payload.len()
    }

    fn finish(self) -> EncodedFrame {
        EncodedFrame {
            frame_type: self.header.frame_type,
            is_keyframe: self.header.is_keyframe,
            pts: self.header.pts,
            payload: self.payload.freeze(),
        }
    }
}

/// Shared reassembly counters
#[derive(Debug, Default)]
pub struct ReassemblerCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
    protocol_errors: AtomicU64,
}

impl ReassemblerCounters {
    pub fn snapshot(&self) -> ReassemblerStats {
        ReassemblerStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}

/// Reassembly statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    pub frames: u64,
    pub bytes: u64,
    pub protocol_errors: u64,
}

/// Rebuilds [`EncodedFrame`]s from a fragmented byte stream
pub struct FrameReassembler {
    mode: FramingMode,
    max_payload_len: usize,
    header_buf: [u8; HEADER_LEN],
    header_filled: usize,
    pending: Option<Pending>,
    counters: Arc<ReassemblerCounters>,
}

impl FrameReassembler {
    pub fn new(mode: FramingMode) -> Self {
        Self::with_max_payload(mode, MAX_PAYLOAD_LEN)
    }

    pub fn with_max_payload(mode: FramingMode, max_payload_len: usize) -> Self {
        Self {
            mode,
            max_payload_len,
            header_buf: [0u8; HEADER_LEN],
            header_filled: 0,
            pending: None,
            counters: Arc::new(ReassemblerCounters::default()),
        }
    }

    /// Feed one transport chunk, appending every completed frame to `out`
    ///
    /// Returns the number of frames appended. On a protocol error the
    /// in-flight frame and the rest of the chunk are discarded and the
    /// reassembler waits for a fresh header; frames completed earlier in the
    /// same chunk stay in `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<EncodedFrame>) -> Result<usize, ProtocolError> {
        let start = out.len();
        let mut rest = chunk;
        self.counters.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);

        while !rest.is_empty() {
            match self.pending.as_mut() {
                Some(pending) => {
                    let take = pending.remaining().min(rest.len());
                    pending.payload.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];

                    if pending.remaining() == 0 {
                        if let Some(done) = self.pending.take() {
                            self.emit(done.finish(), out);
                        }
                    }
                }
                None => {
                    if self.mode == FramingMode::MessageAligned
                        && self.header_filled == 0
                        && rest.len() < HEADER_LEN
                    {
                        return Err(self.fail(ProtocolError::TruncatedHeader {
                            available: rest.len(),
                        }));
                    }

                    let take = (HEADER_LEN - self.header_filled).min(rest.len());
                    self.header_buf[self.header_filled..self.header_filled + take]
                        .copy_from_slice(&rest[..take]);
                    self.header_filled += take;
                    rest = &rest[take..];

                    if self.header_filled == HEADER_LEN {
                        self.header_filled = 0;
                        self.begin_frame(out)?;
                    }
                }
            }
        }

        Ok(out.len() - start)
    }

    /// Convenience wrapper around [`feed`](Self::feed) for a single chunk
    pub fn feed_chunk(&mut self, chunk: &[u8]) -> Result<Vec<EncodedFrame>, ProtocolError> {
        let mut out = Vec::new();
        self.feed(chunk, &mut out)?;
        Ok(out)
    }

    /// Drop any partial header or payload
    pub fn reset(&mut self) {
        self.header_filled = 0;
        self.pending = None;
    }

    pub fn state(&self) -> ReassemblerState {
        match &self.pending {
            Some(p) => ReassemblerState::AwaitingPayload {
                got: p.payload.len(),
                len: p.header.payload_len as usize,
            },
            None => ReassemblerState::AwaitingHeader {
                have: self.header_filled,
            },
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.counters.snapshot()
    }

    /// Counters that stay readable after the reassembler moves into a task
    pub fn counters(&self) -> Arc<ReassemblerCounters> {
        self.counters.clone()
    }

    fn begin_frame(&mut self, out: &mut Vec<EncodedFrame>) -> Result<(), ProtocolError> {
        let header = match FrameHeader::decode(&self.header_buf) {
            Ok(header) => header,
            Err(e) => return Err(self.fail(e)),
        };

        let len = header.payload_len as usize;
        if len > self.max_payload_len {
            return Err(self.fail(ProtocolError::PayloadTooLarge {
                len,
                max: self.max_payload_len,
            }));
        }

        if len == 0 {
            self.emit(
                EncodedFrame {
                    frame_type: header.frame_type,
                    is_keyframe: header.is_keyframe,
                    pts: header.pts,
                    payload: Bytes::new(),
                },
                out,
            );
        } else {
            self.pending = Some(Pending {
                header,
                payload: BytesMut::with_capacity(len),
            });
        }
        Ok(())
    }

    fn emit(&self, frame: EncodedFrame, out: &mut Vec<EncodedFrame>) {
        tracing::trace!(
            "Reassembled {} frame pts={} len={} key={}",
            frame.frame_type,
            frame.pts,
            frame.payload.len(),
            frame.is_keyframe
        );
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        out.push(frame);
    }

    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        self.reset();
        self.counters.protocol_errors.fetch_add(1, Ordering::Relaxed);
        err
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new(FramingMode::default())
    }
}
