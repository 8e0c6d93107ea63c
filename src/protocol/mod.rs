//! Wire framing protocol
//!
//! Every media frame travels as a fixed 14-byte header followed by its
//! payload, which may be split across any number of transport messages.

pub mod frame;
pub mod reassembler;
pub mod writer;

pub use frame::{EncodedFrame, FrameHeader, FrameType};
pub use reassembler::{FrameReassembler, FramingMode, ReassemblerState, ReassemblerStats};
pub use writer::FrameWriter;
