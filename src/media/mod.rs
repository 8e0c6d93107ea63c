//! Demo stream sources: Annex-B H.264 and raw A-law files

pub mod nalu;
pub mod source;

pub use nalu::split_annex_b;
pub use source::{AlawFileSource, H264FileSource};
