//! Annex-B elementary stream splitting

use crate::error::NaluError;

/// NAL unit types the demo source cares about
pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

/// 4-byte start code used when re-assembling access units
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

fn start_code_len(data: &[u8], pos: usize) -> Option<usize> {
    match &data[pos..] {
        [0, 0, 1, ..] => Some(3),
        [0, 0, 0, 1, ..] => Some(4),
        _ => None,
    }
}

/// H.264 `nal_unit_type` of a NAL unit (without start code)
pub fn nal_type(nalu: &[u8]) -> Option<u8> {
    nalu.first().map(|b| b & 0x1f)
}

/// Split an Annex-B byte stream into NAL units, start codes stripped
///
/// Both 3- and 4-byte start codes are accepted. The input must begin with a
/// start code.
pub fn split_annex_b(data: &[u8]) -> Result<Vec<&[u8]>, NaluError> {
    if data.len() < 4 {
        return Err(NaluError::TooShort(data.len()));
    }
    if start_code_len(data, 0).is_none() {
        return Err(NaluError::MissingStartCode);
    }

    let mut nalus = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < data.len() {
        match start_code_len(data, pos) {
            Some(len) => {
                if pos > start {
                    nalus.push(&data[start..pos]);
                }
                pos += len;
                start = pos;
            }
            None => pos += 1,
        }
    }
    if start < data.len() {
        nalus.push(&data[start..]);
    }

    if nalus.is_empty() {
        return Err(NaluError::NoNalUnits);
    }
    Ok(nalus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_start_codes() {
        let data = [0, 0, 0, 1, 0x67, 0xAA, 0, 0, 1, 0x68, 0xBB, 0, 0, 0, 1, 0x65, 1, 2, 3];
        let nalus = split_annex_b(&data).unwrap();

        assert_eq!(nalus, vec![&[0x67, 0xAA][..], &[0x68, 0xBB][..], &[0x65, 1, 2, 3][..]]);
        assert_eq!(nalus.iter().map(|n| nal_type(n)).collect::<Vec<_>>(), vec![Some(7), Some(8), Some(5)]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(split_annex_b(&[0, 0, 1]), Err(NaluError::TooShort(3)));
        assert_eq!(split_annex_b(&[1, 2, 3, 4, 5]), Err(NaluError::MissingStartCode));
        assert_eq!(split_annex_b(&[0, 0, 0, 1]), Err(NaluError::NoNalUnits));
    }
}
