//! File-backed frame sources for the demo server

use bytes::{BufMut, Bytes, BytesMut};
use std::path::Path;

use crate::constants::PCMA_SAMPLE_RATE;
use crate::error::{NaluError, Result};
use crate::media::nalu::{nal_type, split_annex_b, NAL_IDR, NAL_PPS, NAL_SLICE, NAL_SPS, START_CODE};
use crate::protocol::{EncodedFrame, FrameType};

/// Turns an Annex-B H.264 file into access-unit frames
///
/// SPS and PPS are cached and prepended to every IDR, so each keyframe is
/// independently decodable. Other NAL types are skipped.
pub struct H264FileSource {
    nalus: Vec<Bytes>,
    index: usize,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    pts: u64,
    frame_interval: u64,
}

impl H264FileSource {
    pub fn from_bytes(data: Bytes, frame_interval: u64) -> std::result::Result<Self, NaluError> {
        let nalus = split_annex_b(&data)?
            .into_iter()
            .map(|nalu| data.slice_ref(nalu))
            .collect();

        Ok(Self {
            nalus,
            index: 0,
            sps: None,
            pps: None,
            pts: 0,
            frame_interval,
        })
    }

    pub fn open(path: impl AsRef<Path>, frame_interval: u64) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let source = Self::from_bytes(Bytes::from(data), frame_interval)?;
        tracing::info!(
            "Loaded {} NAL units from {}",
            source.nalus.len(),
            path.as_ref().display()
        );
        Ok(source)
    }

    /// NAL units not yet consumed
    pub fn remaining_nalus(&self) -> usize {
        self.nalus.len() - self.index
    }

    fn keyframe_payload(&self, idr: &Bytes) -> Bytes {
        let parts = [self.sps.as_ref(), self.pps.as_ref(), Some(idr)];
        let len: usize = parts.iter().flatten().map(|p| START_CODE.len() + p.len()).sum();

        let mut buf = BytesMut::with_capacity(len);
        for part in parts.into_iter().flatten() {
            buf.put_slice(&START_CODE);
            buf.put_slice(part);
        }
        buf.freeze()
    }

    fn delta_payload(nalu: &Bytes) -> Bytes {
        let mut buf = BytesMut::with_capacity(START_CODE.len() + nalu.len());
        buf.put_slice(&START_CODE);
        buf.put_slice(nalu);
        buf.freeze()
    }
}

impl Iterator for H264FileSource {
    type Item = EncodedFrame;

    fn next(&mut self) -> Option<EncodedFrame> {
        while self.index < self.nalus.len() {
            let nalu = self.nalus[self.index].clone();
            self.index += 1;

            match nal_type(&nalu) {
                Some(NAL_SPS) => self.sps = Some(nalu),
                Some(NAL_PPS) => self.pps = Some(nalu),
                Some(NAL_IDR) => {
                    self.pts += self.frame_interval;
                    let payload = self.keyframe_payload(&nalu);
                    return Some(EncodedFrame::new(FrameType::H264, true, self.pts, payload));
                }
                Some(NAL_SLICE) => {
                    self.pts += self.frame_interval;
                    return Some(EncodedFrame::new(FrameType::H264, false, self.pts, Self::delta_payload(&nalu)));
                }
                _ => {}
            }
        }
        None
    }
}

/// Chops a raw G.711 A-law file into fixed-size frames
pub struct AlawFileSource {
    data: Bytes,
    offset: usize,
    chunk_len: usize,
    pts: u64,
}

impl AlawFileSource {
    pub fn from_bytes(data: Bytes, chunk_len: usize) -> Self {
        Self {
            data,
            offset: 0,
            chunk_len: chunk_len.max(1),
            pts: 0,
        }
    }

    pub fn open(path: impl AsRef<Path>, chunk_len: usize) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        tracing::info!("Loaded {} bytes of A-law from {}", data.len(), path.as_ref().display());
        Ok(Self::from_bytes(Bytes::from(data), chunk_len))
    }
}

impl Iterator for AlawFileSource {
    type Item = EncodedFrame;

    fn next(&mut self) -> Option<EncodedFrame> {
        if self.offset >= self.data.len() {
            return None;
        }

        let end = (self.offset + self.chunk_len).min(self.data.len());
        let payload = self.data.slice(self.offset..end);
        self.offset = end;
        // One byte per sample; pts in milliseconds.
        self.pts += payload.len() as u64 * 1000 / PCMA_SAMPLE_RATE as u64;

        Some(EncodedFrame::new(FrameType::Pcma, false, self.pts, payload))
    }
}
