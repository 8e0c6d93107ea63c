//! Routing of encoded frames to decoder workers
//!
//! One dispatcher exists per playback session. Each configured decoder runs on
//! a dedicated thread fed by an unbounded queue: every dispatched frame gets
//! exactly one decode call, and the receive path never waits on a decoder.
//! Completed frames and decode failures are posted on a single completion
//! channel shared by all workers. Depth limits apply to decoded frames, in the
//! synchronizer queues.

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, SendError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::codec::{AudioDecoder, DecodedAudioFrame, DecodedVideoFrame, DecoderSet, VideoDecoder};
use crate::error::CodecError;
use crate::protocol::{EncodedFrame, FrameType};

/// Output of the decode boundary
#[derive(Debug)]
pub enum DecodeEvent {
    Video(DecodedVideoFrame),
    Audio(DecodedAudioFrame),
    Failed {
        frame_type: FrameType,
        pts: u64,
        error: CodecError,
    },
}

/// What happened to a dispatched frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// No decoder configured for this type
    NoDecoder,
}

struct Job {
    payload: Bytes,
    pts: u64,
    is_keyframe: bool,
}

fn slot(frame_type: FrameType) -> usize {
    match frame_type {
        FrameType::H264 => 0,
        FrameType::H265 => 1,
        FrameType::Pcma => 2,
    }
}

/// Per-type dispatch counters
#[derive(Debug, Default)]
pub struct DispatchCounters {
    dispatched: [AtomicU64; 3],
    no_decoder: [AtomicU64; 3],
    decoded: [AtomicU64; 3],
    decode_errors: AtomicU64,
}

impl DispatchCounters {
    pub fn snapshot(&self) -> DispatchStats {
        let load = |arr: &[AtomicU64; 3]| {
            [
                arr[0].load(Ordering::Relaxed),
                arr[1].load(Ordering::Relaxed),
                arr[2].load(Ordering::Relaxed),
            ]
        };
        DispatchStats {
            dispatched: load(&self.dispatched),
            dropped_no_decoder: load(&self.no_decoder),
            decoded: load(&self.decoded),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Dispatch statistics, indexed H264 / H265 / PCMA
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: [u64; 3],
    pub dropped_no_decoder: [u64; 3],
    /// Decode calls completed, successful or not
    pub decoded: [u64; 3],
    pub decode_errors: u64,
}

impl DispatchStats {
    pub fn dispatched(&self, frame_type: FrameType) -> u64 {
        self.dispatched[slot(frame_type)]
    }

    pub fn dropped_no_decoder(&self, frame_type: FrameType) -> u64 {
        self.dropped_no_decoder[slot(frame_type)]
    }

    pub fn decoded(&self, frame_type: FrameType) -> u64 {
        self.decoded[slot(frame_type)]
    }

    /// Frames handed to a worker but not decoded yet
    pub fn backlog(&self, frame_type: FrameType) -> u64 {
        let idx = slot(frame_type);
        self.dispatched[idx].saturating_sub(self.decoded[idx])
    }
}

/// Routes frames by type to their decoder worker
pub struct DecodeDispatcher {
    h264: Option<Sender<Job>>,
    h265: Option<Sender<Job>>,
    pcma: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<DispatchCounters>,
}

impl DecodeDispatcher {
    /// Start one worker per configured decoder
    pub fn new(decoders: DecoderSet, events: Sender<DecodeEvent>) -> Result<Self, CodecError> {
        let counters = Arc::new(DispatchCounters::default());
        let mut workers = Vec::new();
        let DecoderSet { h264, h265, pcma } = decoders;

        let h264 = h264
            .map(|d| spawn_video(FrameType::H264, d, &events, &counters))
            .transpose()?
            .map(|(tx, handle)| {
                workers.push(handle);
                tx
            });
        let h265 = h265
            .map(|d| spawn_video(FrameType::H265, d, &events, &counters))
            .transpose()?
            .map(|(tx, handle)| {
                workers.push(handle);
                tx
            });
        let pcma = pcma
            .map(|d| spawn_audio(d, &events, &counters))
            .transpose()?
            .map(|(tx, handle)| {
                workers.push(handle);
                tx
            });

        tracing::debug!(
            "Decode dispatcher started: h264={} h265={} pcma={}",
            h264.is_some(),
            h265.is_some(),
            pcma.is_some()
        );

        Ok(Self {
            h264,
            h265,
            pcma,
            workers,
            counters,
        })
    }

    /// Hand one frame to its decoder
    ///
    /// Never blocks. Frames without a decoder are dropped; every other frame
    /// reaches its worker.
    pub fn dispatch(&self, frame: EncodedFrame) -> DispatchOutcome {
        let frame_type = frame.frame_type;
        let idx = slot(frame_type);
        let worker = match frame_type {
            FrameType::H264 => self.h264.as_ref(),
            FrameType::H265 => self.h265.as_ref(),
            FrameType::Pcma => self.pcma.as_ref(),
        };

        let Some(tx) = worker else {
            tracing::trace!("No {} decoder, dropping pts={}", frame_type, frame.pts);
            self.counters.no_decoder[idx].fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::NoDecoder;
        };

        let job = Job {
            payload: frame.payload,
            pts: frame.pts,
            is_keyframe: frame.is_keyframe,
        };

        match tx.send(job) {
            Ok(()) => {
                self.counters.dispatched[idx].fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Queued
            }
            Err(SendError(job)) => {
                tracing::warn!("{} decoder worker gone, dropping pts={}", frame_type, job.pts);
                self.counters.no_decoder[idx].fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::NoDecoder
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    pub fn counters(&self) -> Arc<DispatchCounters> {
        self.counters.clone()
    }

    /// Close worker inputs and wait for in-flight decodes to finish
    pub fn shutdown(mut self) {
        self.h264 = None;
        self.h265 = None;
        self.pcma = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Create the completion channel shared by all workers of a session
///
/// Workers block while it is full, so nothing decoded is lost on the way to
/// the synchronizer.
pub fn completion_channel(capacity: usize) -> (Sender<DecodeEvent>, Receiver<DecodeEvent>) {
    bounded(capacity)
}

fn spawn_video(
    frame_type: FrameType,
    mut decoder: Box<dyn VideoDecoder>,
    events: &Sender<DecodeEvent>,
    counters: &Arc<DispatchCounters>,
) -> Result<(Sender<Job>, JoinHandle<()>), CodecError> {
    spawn_worker(frame_type, events, counters, move |job| {
        decoder
            .decode(&job.payload, job.pts, job.is_keyframe)
            .map(|frames| frames.into_iter().map(DecodeEvent::Video).collect())
    })
}

fn spawn_audio(
    mut decoder: Box<dyn AudioDecoder>,
    events: &Sender<DecodeEvent>,
    counters: &Arc<DispatchCounters>,
) -> Result<(Sender<Job>, JoinHandle<()>), CodecError> {
    spawn_worker(FrameType::Pcma, events, counters, move |job| {
        decoder
            .decode(&job.payload, job.pts)
            .map(|frames| frames.into_iter().map(DecodeEvent::Audio).collect())
    })
}

fn spawn_worker<F>(
    frame_type: FrameType,
    events: &Sender<DecodeEvent>,
    counters: &Arc<DispatchCounters>,
    mut decode: F,
) -> Result<(Sender<Job>, JoinHandle<()>), CodecError>
where
    F: FnMut(&Job) -> Result<Vec<DecodeEvent>, CodecError> + Send + 'static,
{
    let (tx, rx) = unbounded::<Job>();
    let events = events.clone();
    let counters = counters.clone();

    let handle = thread::Builder::new()
        .name(format!("decode-{}", frame_type))
        .spawn(move || {
            let idx = slot(frame_type);
            for job in rx.iter() {
                let result = decode(&job);
                counters.decoded[idx].fetch_add(1, Ordering::Relaxed);
                let produced = match result {
                    Ok(produced) => produced,
                    Err(error) => {
                        counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                        vec![DecodeEvent::Failed {
                            frame_type,
                            pts: job.pts,
                            error,
                        }]
                    }
                };

                for event in produced {
                    if events.send(event).is_err() {
                        tracing::debug!("decode-{} completion channel closed", frame_type);
                        return;
                    }
                }
            }
            tracing::debug!("decode-{} worker exiting", frame_type);
        })
        .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

    Ok((tx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AlawDecoder, PixelFormat};
    use std::time::Duration;

    struct EchoDecoder;

    impl VideoDecoder for EchoDecoder {
        fn decode(&mut self, payload: &[u8], pts: u64, is_keyframe: bool) -> Result<Vec<DecodedVideoFrame>, CodecError> {
            if !is_keyframe && payload.is_empty() {
                return Err(CodecError::DecodingFailed("empty delta".into()));
            }
            Ok(vec![DecodedVideoFrame {
                pts,
                width: 2,
                height: 2,
                format: PixelFormat::I420,
                pixels: payload.to_vec(),
            }])
        }
    }

    struct SlowDecoder(Duration);

    impl VideoDecoder for SlowDecoder {
        fn decode(&mut self, _: &[u8], pts: u64, _: bool) -> Result<Vec<DecodedVideoFrame>, CodecError> {
            std::thread::sleep(self.0);
            Ok(vec![DecodedVideoFrame {
                pts,
                width: 2,
                height: 2,
                format: PixelFormat::I420,
                pixels: Vec::new(),
            }])
        }
    }

    struct BlockingDecoder(Receiver<()>);

    impl VideoDecoder for BlockingDecoder {
        fn decode(&mut self, _: &[u8], _: u64, _: bool) -> Result<Vec<DecodedVideoFrame>, CodecError> {
            let _ = self.0.recv();
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_routes_by_type() {
        let (tx, rx) = completion_channel(16);
        let dispatcher = DecodeDispatcher::new(
            DecoderSet::new().with_h264(EchoDecoder).with_pcma(AlawDecoder::new()),
            tx,
        )
        .unwrap();

        assert_eq!(
            dispatcher.dispatch(EncodedFrame::new(FrameType::H264, true, 40, vec![1, 2, 3])),
            DispatchOutcome::Queued
        );
        assert_eq!(
            dispatcher.dispatch(EncodedFrame::new(FrameType::Pcma, false, 40, vec![0xD5; 8])),
            DispatchOutcome::Queued
        );
        assert_eq!(
            dispatcher.dispatch(EncodedFrame::new(FrameType::H265, true, 40, vec![1])),
            DispatchOutcome::NoDecoder
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched(FrameType::H264), 1);
        assert_eq!(stats.dropped_no_decoder(FrameType::H265), 1);
        dispatcher.shutdown();

        let events: Vec<DecodeEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| matches!(e, DecodeEvent::Video(f) if f.pts == 40)));
        assert!(events.iter().any(|e| matches!(e, DecodeEvent::Audio(f) if f.samples.len() == 8)));
    }

    #[test]
    fn test_decode_error_is_reported() {
        let (tx, rx) = completion_channel(16);
        let dispatcher = DecodeDispatcher::new(DecoderSet::new().with_h264(EchoDecoder), tx).unwrap();

        dispatcher.dispatch(EncodedFrame::new(FrameType::H264, false, 80, Vec::new()));
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            event,
            DecodeEvent::Failed { frame_type: FrameType::H264, pts: 80, .. }
        ));
        dispatcher.shutdown();
    }

    #[test]
    fn test_burst_decodes_every_frame() {
        let (tx, rx) = completion_channel(crate::constants::DEFAULT_COMPLETION_QUEUE_CAPACITY);
        let dispatcher =
            DecodeDispatcher::new(DecoderSet::new().with_h264(SlowDecoder(Duration::from_millis(2))), tx).unwrap();

        for pts in 0..100 {
            let frame = EncodedFrame::new(FrameType::H264, pts == 0, pts, vec![0x41; 32]);
            assert_eq!(dispatcher.dispatch(frame), DispatchOutcome::Queued);
        }

        let decoded: Vec<u64> = (0..100)
            .map(|_| match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                DecodeEvent::Video(frame) => frame.pts,
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(decoded, (0..100).collect::<Vec<_>>());

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched(FrameType::H264), 100);
        assert_eq!(stats.decoded(FrameType::H264), 100);
        assert_eq!(stats.backlog(FrameType::H264), 0);
        dispatcher.shutdown();
    }

    #[test]
    fn test_busy_decoder_never_blocks_dispatch() {
        let (release_tx, release_rx) = bounded::<()>(0);
        let (tx, _rx) = completion_channel(16);
        let dispatcher =
            DecodeDispatcher::new(DecoderSet::new().with_h264(BlockingDecoder(release_rx)), tx).unwrap();

        for pts in 0..10 {
            let outcome = dispatcher.dispatch(EncodedFrame::new(FrameType::H264, true, pts, vec![0]));
            assert_eq!(outcome, DispatchOutcome::Queued);
        }
        assert!(dispatcher.stats().backlog(FrameType::H264) >= 9);

        drop(release_tx);
        let counters = dispatcher.counters();
        dispatcher.shutdown();
        assert_eq!(counters.snapshot().decoded(FrameType::H264), 10);
    }

    #[test]
    fn test_full_completion_channel_loses_nothing() {
        let (tx, rx) = completion_channel(1);
        let dispatcher = DecodeDispatcher::new(DecoderSet::new().with_h264(EchoDecoder), tx).unwrap();

        // Every fifth frame is an empty delta and fails to decode.
        for pts in 0..20u64 {
            let payload = if pts % 5 == 4 { Vec::new() } else { vec![1] };
            dispatcher.dispatch(EncodedFrame::new(FrameType::H264, false, pts, payload));
        }

        let events: Vec<DecodeEvent> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        let failed = events.iter().filter(|e| matches!(e, DecodeEvent::Failed { .. })).count();
        let video = events.iter().filter(|e| matches!(e, DecodeEvent::Video(_))).count();
        assert_eq!((video, failed), (16, 4));

        dispatcher.shutdown();
        assert!(rx.try_recv().is_err());
    }
}
