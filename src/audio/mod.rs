//! Local audio output

pub mod buffer;
pub mod device;
pub mod output;

pub use buffer::{ChunkReader, PcmChunk, SampleBuffer};
pub use device::{find_output_device, list_output_devices, OutputDeviceInfo};
pub use output::{CpalAudioSink, OutputStats};
