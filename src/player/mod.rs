//! Playback control
//!
//! [`PlaybackController`] is the public surface; each `play()` after a stop
//! builds a new session with its own reassembler, decoders and synchronizer.

pub mod controller;
mod session;

pub use controller::{DecoderFactory, PlaybackController, PlaybackState, PlayerEvent, PlayerStats};
