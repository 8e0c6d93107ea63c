//! Audio-clocked A/V synchronizer
//!
//! Video has no clock of its own. The first decoded audio frame anchors a
//! [`PlaybackClock`] to the audio device time, and every scheduling tick
//! converts the current device time into a stream position. Queued frames
//! are then rendered, dropped or left waiting depending on where their pts
//! falls relative to that position:
//!
//! ```text
//!        drop           │        render          │     wait
//!  ─────────────────────┼───────────┬────────────┼──────────────▶ pts
//!               current - late   current   current + early
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

use crate::codec::{DecodedAudioFrame, DecodedVideoFrame};
use crate::config::SyncConfig;
use crate::sink::{AudioSink, VideoSink};
use crate::sync::clock::PlaybackClock;
use crate::sync::queue::{FrameQueue, PushOutcome};

/// How queued audio reaches the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPolicy {
    /// `Drain` for sinks that schedule playback themselves, `Windowed` otherwise
    #[default]
    Auto,
    /// Same late/early window as video
    Windowed,
    /// Hand every queued frame to the sink on each tick
    Drain,
}

impl AudioPolicy {
    fn resolve(self, sink: &dyn AudioSink) -> AudioPolicy {
        match self {
            AudioPolicy::Auto if sink.schedules_playback() => AudioPolicy::Drain,
            AudioPolicy::Auto => AudioPolicy::Windowed,
            explicit => explicit,
        }
    }
}

/// Scheduling verdict for one queued frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Drop,
    Render,
    Wait,
}

/// Classify a frame against the current stream position
pub fn decide(pts: u64, current_pts: f64, late_threshold: u64, early_threshold: u64) -> Decision {
    let pts = pts as f64;
    if pts < current_pts - late_threshold as f64 {
        Decision::Drop
    } else if pts <= current_pts + early_threshold as f64 {
        Decision::Render
    } else {
        Decision::Wait
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// `None` until the clock is armed
    pub current_pts: Option<f64>,
    pub video_rendered: usize,
    pub video_dropped: usize,
    /// In-window frames consumed without rendering while paused
    pub video_skipped: usize,
    pub audio_played: usize,
    pub audio_dropped: usize,
}

#[derive(Debug, Default)]
struct SyncCounters {
    ticks: AtomicU64,
    video_rendered: AtomicU64,
    video_dropped: AtomicU64,
    video_skipped: AtomicU64,
    video_evicted: AtomicU64,
    audio_played: AtomicU64,
    audio_dropped: AtomicU64,
    audio_evicted: AtomicU64,
    discarded_after_close: AtomicU64,
}

/// Cumulative synchronizer statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    pub ticks: u64,
    pub video_rendered: u64,
    pub video_dropped: u64,
    pub video_skipped: u64,
    pub video_evicted: u64,
    pub audio_played: u64,
    pub audio_dropped: u64,
    pub audio_evicted: u64,
    pub discarded_after_close: u64,
    pub video_queue_len: usize,
    pub audio_queue_len: usize,
    pub clock: Option<PlaybackClock>,
}

/// Owns the decoded-frame queues and the playback clock of one session
pub struct Synchronizer {
    late_threshold: u64,
    early_threshold: u64,
    clock_rate: u32,
    audio_policy: AudioPolicy,
    video: FrameQueue<DecodedVideoFrame>,
    audio: FrameQueue<DecodedAudioFrame>,
    clock: OnceLock<PlaybackClock>,
    armed: watch::Sender<bool>,
    rendering: AtomicBool,
    closed: AtomicBool,
    // Serializes ticks so two callers never interleave head inspection.
    tick_lock: Mutex<()>,
    video_sink: Arc<dyn VideoSink>,
    audio_sink: Arc<dyn AudioSink>,
    counters: SyncCounters,
}

impl Synchronizer {
    pub fn new(config: &SyncConfig, video_sink: Arc<dyn VideoSink>, audio_sink: Arc<dyn AudioSink>) -> Self {
        let audio_policy = config.audio_policy.resolve(audio_sink.as_ref());
        tracing::info!(
            "Synchronizer: late={} early={} tick={}ms audio_policy={:?}",
            config.late_threshold,
            config.early_threshold,
            config.tick_interval_ms,
            audio_policy
        );

        let (armed, _) = watch::channel(false);
        Self {
            late_threshold: config.late_threshold,
            early_threshold: config.early_threshold,
            clock_rate: config.clock_rate,
            audio_policy,
            video: FrameQueue::new(config.video_queue_capacity, config.overflow_policy),
            audio: FrameQueue::new(config.audio_queue_capacity, config.overflow_policy),
            clock: OnceLock::new(),
            armed,
            rendering: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            tick_lock: Mutex::new(()),
            video_sink,
            audio_sink,
            counters: SyncCounters::default(),
        }
    }

    /// Queue a decoded audio frame, anchoring the clock on the first one
    pub fn on_audio_frame_decoded(&self, frame: DecodedAudioFrame) {
        if self.closed.load(Ordering::Acquire) {
            self.counters.discarded_after_close.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut armed_now = false;
        let clock = self.clock.get_or_init(|| {
            armed_now = true;
            PlaybackClock::new(self.audio_sink.current_time(), frame.pts, self.clock_rate)
        });
        if armed_now {
            tracing::info!(
                "Playback clock armed: pts {} at device time {:.3}s",
                clock.origin_pts,
                clock.origin_device_time
            );
            self.armed.send_replace(true);
        }

        match self.audio.push(frame) {
            PushOutcome::Inserted => {}
            PushOutcome::Evicted(old) | PushOutcome::Rejected(old) => {
                tracing::debug!("Audio queue full, dropped pts={}", old.pts);
                self.counters.audio_evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        // Lost a race with close(): undo the push.
        if self.closed.load(Ordering::Acquire) {
            self.audio.clear();
        }
    }

    /// Queue a decoded video frame
    pub fn on_video_frame_decoded(&self, frame: DecodedVideoFrame) {
        if self.closed.load(Ordering::Acquire) {
            self.counters.discarded_after_close.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.video.push(frame) {
            PushOutcome::Inserted => {}
            PushOutcome::Evicted(old) | PushOutcome::Rejected(old) => {
                tracing::debug!("Video queue full, dropped pts={}", old.pts);
                self.counters.video_evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        if self.closed.load(Ordering::Acquire) {
            self.video.clear();
        }
    }

    /// Run one scheduling pass against the audio device clock
    pub fn tick(&self) -> TickReport {
        self.tick_at(self.audio_sink.current_time())
    }

    /// Run one scheduling pass at an explicit device time
    pub fn tick_at(&self, device_time: f64) -> TickReport {
        let Some(clock) = self.clock.get() else {
            return TickReport::default();
        };
        let _guard = self.tick_lock.lock();
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let current = clock.current_pts(device_time);
        let mut report = TickReport {
            current_pts: Some(current),
            ..TickReport::default()
        };

        self.schedule_video(current, &mut report);
        match self.audio_policy {
            AudioPolicy::Drain => self.drain_audio(&mut report),
            _ => self.schedule_audio(current, &mut report),
        }
        report
    }

    fn schedule_video(&self, current: f64, report: &mut TickReport) {
        let rendering = self.rendering.load(Ordering::Acquire);

        while let Some(frame) = self
            .video
            .pop_front_if(|pts| decide(pts, current, self.late_threshold, self.early_threshold) != Decision::Wait)
        {
            match decide(frame.pts, current, self.late_threshold, self.early_threshold) {
                Decision::Drop => {
                    tracing::debug!("Dropping late video frame pts={} (current {:.0})", frame.pts, current);
                    report.video_dropped += 1;
                    self.counters.video_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Decision::Render if rendering => {
                    self.video_sink.render_frame(frame);
                    report.video_rendered += 1;
                    self.counters.video_rendered.fetch_add(1, Ordering::Relaxed);
                }
                Decision::Render => {
                    report.video_skipped += 1;
                    self.counters.video_skipped.fetch_add(1, Ordering::Relaxed);
                }
                Decision::Wait => break,
            }
        }
    }

    fn schedule_audio(&self, current: f64, report: &mut TickReport) {
        while let Some(frame) = self
            .audio
            .pop_front_if(|pts| decide(pts, current, self.late_threshold, self.early_threshold) != Decision::Wait)
        {
            match decide(frame.pts, current, self.late_threshold, self.early_threshold) {
                Decision::Drop => {
                    tracing::debug!("Dropping late audio frame pts={} (current {:.0})", frame.pts, current);
                    report.audio_dropped += 1;
                    self.counters.audio_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Decision::Render => {
                    self.audio_sink.play(frame);
                    report.audio_played += 1;
                    self.counters.audio_played.fetch_add(1, Ordering::Relaxed);
                }
                Decision::Wait => break,
            }
        }
    }

    fn drain_audio(&self, report: &mut TickReport) {
        for frame in self.audio.drain_all() {
            self.audio_sink.play(frame);
            report.audio_played += 1;
        }
        self.counters
            .audio_played
            .fetch_add(report.audio_played as u64, Ordering::Relaxed);
    }

    /// Gate video render calls; frames keep draining either way
    pub fn set_rendering(&self, enabled: bool) {
        self.rendering.store(enabled, Ordering::Release);
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }

    /// Wait until the first audio frame has anchored the clock
    pub async fn wait_until_armed(&self) {
        let mut rx = self.armed.subscribe();
        // The sender lives as long as `self`, so this only returns once armed.
        let _ = rx.wait_for(|armed| *armed).await;
    }

    pub fn clock(&self) -> Option<PlaybackClock> {
        self.clock.get().copied()
    }

    pub fn is_armed(&self) -> bool {
        self.clock.get().is_some()
    }

    pub fn audio_policy(&self) -> AudioPolicy {
        self.audio_policy
    }

    /// End the session: clear both queues and ignore later arrivals
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.video.clear();
        self.audio.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn video_queue(&self) -> &FrameQueue<DecodedVideoFrame> {
        &self.video
    }

    pub fn audio_queue(&self) -> &FrameQueue<DecodedAudioFrame> {
        &self.audio
    }

    pub fn stats(&self) -> SyncStats {
        let c = &self.counters;
        SyncStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            video_rendered: c.video_rendered.load(Ordering::Relaxed),
            video_dropped: c.video_dropped.load(Ordering::Relaxed),
            video_skipped: c.video_skipped.load(Ordering::Relaxed),
            video_evicted: c.video_evicted.load(Ordering::Relaxed),
            audio_played: c.audio_played.load(Ordering::Relaxed),
            audio_dropped: c.audio_dropped.load(Ordering::Relaxed),
            audio_evicted: c.audio_evicted.load(Ordering::Relaxed),
            discarded_after_close: c.discarded_after_close.load(Ordering::Relaxed),
            video_queue_len: self.video.len(),
            audio_queue_len: self.audio.len(),
            clock: self.clock(),
        }
    }
}
