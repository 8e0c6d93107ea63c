//! Output boundaries
//!
//! Rendering to a display surface and pushing samples to an audio device
//! happen outside the synchronizer. Both calls are fire-and-forget: the
//! scheduling tick must never wait on them.

use crate::codec::{DecodedAudioFrame, DecodedVideoFrame};

/// Display surface
///
/// Called from the scheduling tick at up to display rate.
pub trait VideoSink: Send + Sync {
    fn render_frame(&self, frame: DecodedVideoFrame);
}

/// Audio output device, also the session's reference clock
pub trait AudioSink: Send + Sync {
    /// Queue samples for playback without blocking
    fn play(&self, frame: DecodedAudioFrame);

    /// Monotonically non-decreasing device clock in seconds
    fn current_time(&self) -> f64;

    /// Output gain, 0.0 mutes
    fn set_volume(&self, level: f32);

    /// True when the sink lays chunks back to back on its own timeline, so
    /// frames can be handed over as soon as they are decoded.
    fn schedules_playback(&self) -> bool {
        false
    }
}
