//! Playback synchronization
//!
//! Decoded frames land in pts-ordered queues; a periodic tick releases them
//! to the sinks against a clock anchored on the audio device.

pub mod clock;
pub mod queue;
pub mod synchronizer;

pub use clock::PlaybackClock;
pub use queue::{FrameQueue, OverflowPolicy, PushOutcome, Timestamped};
pub use synchronizer::{decide, AudioPolicy, Decision, SyncStats, Synchronizer, TickReport};
