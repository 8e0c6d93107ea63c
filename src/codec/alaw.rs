//! G.711 A-law decoder
//!
//! Table-driven expansion of 8-bit A-law codes to 16-bit linear PCM.

use crate::codec::{AudioDecoder, DecodedAudioFrame};
use crate::constants::{PCMA_CHANNELS, PCMA_SAMPLE_RATE};
use crate::error::CodecError;

const fn expand(code: u8) -> i16 {
    let a = code ^ 0x55;
    let mut t = ((a & 0x0F) as i16) << 4;
    let seg = (a & 0x70) >> 4;
    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }
    if a & 0x80 != 0 {
        t
    } else {
        -t
    }
}

const fn build_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = expand(i as u8);
        i += 1;
    }
    table
}

static ALAW_TABLE: [i16; 256] = build_table();

/// Expand one A-law code
pub fn alaw_to_linear(code: u8) -> i16 {
    ALAW_TABLE[code as usize]
}

/// PCMA decoder producing one PCM frame per payload
pub struct AlawDecoder {
    sample_rate: u32,
    channels: u16,
    frames_decoded: u64,
}

impl AlawDecoder {
    pub fn new() -> Self {
        Self::with_format(PCMA_SAMPLE_RATE, PCMA_CHANNELS)
    }

    pub fn with_format(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            frames_decoded: 0,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl Default for AlawDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDecoder for AlawDecoder {
    fn decode(&mut self, payload: &[u8], pts: u64) -> Result<Vec<DecodedAudioFrame>, CodecError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if payload.len() % self.channels as usize != 0 {
            return Err(CodecError::InvalidPayload(format!(
                "{} bytes is not a whole number of {}-channel samples",
                payload.len(),
                self.channels
            )));
        }

        self.frames_decoded += 1;
        Ok(vec![DecodedAudioFrame {
            pts,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: payload.iter().map(|&b| alaw_to_linear(b)).collect(),
        }])
    }

    fn name(&self) -> &str {
        "pcma"
    }
}
