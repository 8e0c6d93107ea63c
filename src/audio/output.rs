//! cpal-backed audio sink
//!
//! The cpal stream is not `Send`, so it is built and kept alive on a
//! dedicated thread. `play()` only converts and enqueues; the device callback
//! pulls chunks back to back, which is what makes the sink self-scheduling.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{apply_edge_fades, to_device_samples, ChunkReader, PcmChunk, SampleBuffer};
use crate::audio::device::{find_output_device, output_config_for_rate};
use crate::codec::DecodedAudioFrame;
use crate::config::AudioOutputConfig;
use crate::error::AudioError;
use crate::sink::AudioSink;

/// Output statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputStats {
    pub chunks_played: u64,
    pub chunks_overflowed: u64,
    pub chunks_rejected: u64,
    pub underruns: u64,
    pub frames_rendered: u64,
    pub buffered_chunks: usize,
}

struct Shared {
    buffer: SampleBuffer,
    /// f32 gain stored as bits
    gain: AtomicU32,
    frames_rendered: AtomicU64,
    running: AtomicBool,
}

/// Audio sink playing PCM on a local output device
pub struct CpalAudioSink {
    shared: Arc<Shared>,
    sample_rate: u32,
    device_channels: u16,
    fade_samples: usize,
    chunks_played: AtomicU64,
    chunks_rejected: AtomicU64,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalAudioSink {
    /// Open the configured device and start the output stream
    ///
    /// Returns once the stream is playing, or with the error that stopped it.
    pub fn new(config: &AudioOutputConfig) -> Result<Self, AudioError> {
        let shared = Arc::new(Shared {
            buffer: SampleBuffer::new(config.buffer_chunks),
            gain: AtomicU32::new(1.0f32.to_bits()),
            frames_rendered: AtomicU64::new(0),
            running: AtomicBool::new(true),
        });

        let (ready_tx, ready_rx) = bounded::<Result<u16, AudioError>>(1);
        let device_name = config.device.clone();
        let sample_rate = config.sample_rate;
        let channels = config.channels;
        let thread_shared = shared.clone();

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), sample_rate, channels, &thread_shared) {
                    Ok((stream, device_channels)) => {
                        let _ = ready_tx.send(Ok(device_channels));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while thread_shared.running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                drop(stream);
                tracing::debug!("audio-output thread exiting");
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let device_channels = match ready_rx.recv() {
            Ok(Ok(ch)) => ch,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamError("output thread exited early".to_string()));
            }
        };

        tracing::info!(
            "Audio output started: {} Hz, {} device channel(s)",
            sample_rate,
            device_channels
        );

        Ok(Self {
            shared,
            sample_rate,
            device_channels,
            fade_samples: config.fade_samples,
            chunks_played: AtomicU64::new(0),
            chunks_rejected: AtomicU64::new(0),
            thread_handle: Some(handle),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_channels(&self) -> u16 {
        self.device_channels
    }

    /// Discard everything queued but not yet rendered
    pub fn flush(&self) {
        self.shared.buffer.clear();
    }

    pub fn stats(&self) -> OutputStats {
        OutputStats {
            chunks_played: self.chunks_played.load(Ordering::Relaxed),
            chunks_overflowed: self.shared.buffer.overflow_count(),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            underruns: self.shared.buffer.underrun_count(),
            frames_rendered: self.shared.frames_rendered.load(Ordering::Relaxed),
            buffered_chunks: self.shared.buffer.len(),
        }
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    channels: u16,
    shared: &Arc<Shared>,
) -> Result<(cpal::Stream, u16), AudioError> {
    let device = find_output_device(device_name)?;
    let config = output_config_for_rate(&device, sample_rate, channels)?;
    let device_channels = config.channels;

    let callback_shared = shared.clone();
    let mut reader = ChunkReader::new();

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let gain = f32::from_bits(callback_shared.gain.load(Ordering::Relaxed));
            reader.fill(&callback_shared.buffer, data, gain);
            // Silence counts too: the clock must advance while starved.
            let frames = (data.len() / device_channels.max(1) as usize) as u64;
            callback_shared.frames_rendered.fetch_add(frames, Ordering::Relaxed);
        },
        move |err| {
            tracing::error!("Audio output stream error: {}", err);
        },
        None,
    )?;
    stream.play()?;

    Ok((stream, device_channels))
}

impl AudioSink for CpalAudioSink {
    fn play(&self, frame: DecodedAudioFrame) {
        if frame.sample_rate != self.sample_rate {
            tracing::warn!(
                "Dropping audio pts={}: {} Hz stream on {} Hz output",
                frame.pts,
                frame.sample_rate,
                self.sample_rate
            );
            self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut samples = to_device_samples(&frame.samples, frame.channels, self.device_channels);
        apply_edge_fades(&mut samples, self.device_channels as usize, self.fade_samples);

        if self.shared.buffer.push(PcmChunk { pts: frame.pts, samples }) {
            self.chunks_played.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::debug!("Audio output buffer full, dropped pts={}", frame.pts);
        }
    }

    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn set_volume(&self, level: f32) {
        self.shared
            .gain
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn schedules_playback(&self) -> bool {
        true
    }
}

impl Drop for CpalAudioSink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_creation() {
        // Only meaningful on machines with an output device.
        let config = AudioOutputConfig::default();
        match CpalAudioSink::new(&config) {
            Ok(sink) => {
                assert!(sink.schedules_playback());
                let t0 = sink.current_time();
                sink.set_volume(0.0);
                sink.play(DecodedAudioFrame {
                    pts: 0,
                    sample_rate: config.sample_rate,
                    channels: 1,
                    samples: vec![0; 320],
                });
                assert!(sink.current_time() >= t0);
            }
            Err(e) => {
                assert!(matches!(
                    e,
                    AudioError::DeviceNotFound(_) | AudioError::UnsupportedFormat(_) | AudioError::StreamError(_)
                ));
            }
        }
    }
}
