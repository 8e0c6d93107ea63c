//! Lock-free sample buffer between `play()` and the device callback
//!
//! Single producer (the synchronizer tick), single consumer (the cpal output
//! callback). Chunks are queued whole; the callback keeps a cursor into the
//! chunk it is currently rendering.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A chunk of device-ready interleaved samples
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    /// Pts of the decoded frame this chunk came from
    pub pts: u64,
    /// Interleaved samples at the device channel count
    pub samples: Vec<f32>,
}

/// Bounded chunk queue with overflow and underrun accounting
pub struct SampleBuffer {
    queue: ArrayQueue<PcmChunk>,
    overflow_count: AtomicU64,
    underrun_count: AtomicU64,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflow_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
        }
    }

    /// Push a chunk; returns false and counts an overflow when full
    pub fn push(&self, chunk: PcmChunk) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn pop(&self) -> Option<PcmChunk> {
        self.queue.pop()
    }

    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Callbacks that had to pad with silence
    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    fn note_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }
}

pub type SharedSampleBuffer = Arc<SampleBuffer>;

/// Consumer-side cursor, owned by the output callback
#[derive(Debug, Default)]
pub struct ChunkReader {
    current: Option<PcmChunk>,
    offset: usize,
}

impl ChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `out` from the buffer, scaled by `gain`, padding with silence
    ///
    /// Returns the number of samples taken from real audio. Only a callback
    /// that started with queued audio and ran dry counts as an underrun.
    pub fn fill(&mut self, buffer: &SampleBuffer, out: &mut [f32], gain: f32) -> usize {
        let mut written = 0;

        while written < out.len() {
            if self.current.is_none() {
                self.current = buffer.pop();
                self.offset = 0;
            }
            let Some(chunk) = self.current.as_ref() else {
                break;
            };

            let available = &chunk.samples[self.offset..];
            let n = available.len().min(out.len() - written);
            for (dst, src) in out[written..written + n].iter_mut().zip(available) {
                *dst = src * gain;
            }
            written += n;
            self.offset += n;

            if self.offset >= chunk.samples.len() {
                self.current = None;
            }
        }

        if written < out.len() {
            if written > 0 {
                buffer.note_underrun();
            }
            out[written..].fill(0.0);
        }
        written
    }

    /// Drop the partially rendered chunk
    pub fn reset(&mut self) {
        self.current = None;
        self.offset = 0;
    }
}

/// Linear fade-in over the first `fade` frames and fade-out over the last
///
/// Operates on interleaved frames; short chunks are faded over half their
/// length each way.
pub fn apply_edge_fades(samples: &mut [f32], channels: usize, fade: usize) {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    let fade = fade.min(frames / 2);
    if fade == 0 {
        return;
    }

    for i in 0..fade {
        let gain = i as f32 / fade as f32;
        for ch in 0..channels {
            samples[i * channels + ch] *= gain;
            samples[(frames - 1 - i) * channels + ch] *= gain;
        }
    }
}

/// Convert 16-bit PCM to f32 and spread it to `out_channels`
///
/// Mono input is copied to every output channel; otherwise channels map
/// one to one and extra output channels are silent.
pub fn to_device_samples(samples: &[i16], in_channels: u16, out_channels: u16) -> Vec<f32> {
    let in_ch = in_channels.max(1) as usize;
    let out_ch = out_channels.max(1) as usize;
    let frames = samples.len() / in_ch;
    let mut out = Vec::with_capacity(frames * out_ch);

    for frame in samples.chunks_exact(in_ch) {
        for ch in 0..out_ch {
            let sample = if in_ch == 1 {
                frame[0]
            } else {
                frame.get(ch).copied().unwrap_or(0)
            };
            out.push(sample as f32 / 32768.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(pts: u64, samples: Vec<f32>) -> PcmChunk {
        PcmChunk { pts, samples }
    }

    #[test]
    fn test_buffer_overflow_is_counted() {
        let buffer = SampleBuffer::new(2);
        assert!(buffer.push(chunk(0, vec![0.0; 4])));
        assert!(buffer.push(chunk(40, vec![0.0; 4])));
        assert!(!buffer.push(chunk(80, vec![0.0; 4])));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.overflow_count(), 1);
    }

    #[test]
    fn test_reader_spans_chunks() {
        let buffer = SampleBuffer::new(4);
        buffer.push(chunk(0, vec![1.0, 2.0, 3.0]));
        buffer.push(chunk(40, vec![4.0, 5.0]));

        let mut reader = ChunkReader::new();
        let mut out = [0.0f32; 4];
        assert_eq!(reader.fill(&buffer, &mut out, 1.0), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);

        let mut out = [9.0f32; 3];
        assert_eq!(reader.fill(&buffer, &mut out, 0.5), 1);
        assert_eq!(out, [2.5, 0.0, 0.0]);
        assert_eq!(buffer.underrun_count(), 1);
    }

    #[test]
    fn test_idle_silence_is_not_underrun() {
        let buffer = SampleBuffer::new(4);
        let mut reader = ChunkReader::new();
        let mut out = [1.0f32; 8];

        assert_eq!(reader.fill(&buffer, &mut out, 1.0), 0);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(buffer.underrun_count(), 0);
    }

    #[test]
    fn test_edge_fades() {
        let mut samples = vec![1.0f32; 200];
        apply_edge_fades(&mut samples, 1, 50);

        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[25], 0.5);
        assert_eq!(samples[100], 1.0);
        assert_eq!(samples[199], 0.0);
    }

    #[test]
    fn test_mono_spreads_to_stereo() {
        let out = to_device_samples(&[16384, -32768], 1, 2);
        assert_eq!(out, vec![0.5, 0.5, -1.0, -1.0]);
    }
}
