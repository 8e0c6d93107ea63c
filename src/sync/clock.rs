//! Audio-anchored playback clock

/// Maps the audio device clock onto the stream's pts timeline
///
/// Anchored once, at the first decoded audio frame of a session; read-only
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    /// Device time (seconds) when the first audio frame arrived
    pub origin_device_time: f64,
    /// Pts of that first audio frame
    pub origin_pts: u64,
    /// Pts units per device second
    pub clock_rate: u32,
}

impl PlaybackClock {
    pub fn new(origin_device_time: f64, origin_pts: u64, clock_rate: u32) -> Self {
        Self {
            origin_device_time,
            origin_pts,
            clock_rate,
        }
    }

    /// Stream position for a device time
    ///
    /// A device time before the origin is clamped to the origin.
    pub fn current_pts(&self, device_time: f64) -> f64 {
        let elapsed = (device_time - self.origin_device_time).max(0.0);
        self.origin_pts as f64 + elapsed * self.clock_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_pts_scales_elapsed_seconds() {
        let clock = PlaybackClock::new(2.0, 1000, 1000);
        assert_eq!(clock.current_pts(2.0), 1000.0);
        assert_eq!(clock.current_pts(2.5), 1500.0);
    }

    #[test]
    fn test_clamps_before_origin() {
        let clock = PlaybackClock::new(2.0, 1000, 1000);
        assert_eq!(clock.current_pts(1.0), 1000.0);
    }
}
