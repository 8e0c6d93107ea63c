//! Preferred decoder with a fallback path
//!
//! Mirrors the usual "hardware if available, software otherwise" setup: the
//! primary decoder handles frames until it reports
//! [`CodecError::Unsupported`], after which the fallback takes over for the
//! rest of the session.

use crate::codec::{DecodedVideoFrame, VideoDecoder};
use crate::error::CodecError;

pub struct FallbackVideoDecoder {
    primary: Option<Box<dyn VideoDecoder>>,
    fallback: Box<dyn VideoDecoder>,
}

impl FallbackVideoDecoder {
    pub fn new(primary: impl VideoDecoder + 'static, fallback: impl VideoDecoder + 'static) -> Self {
        Self {
            primary: Some(Box::new(primary)),
            fallback: Box::new(fallback),
        }
    }

    /// Whether the primary path is still active
    pub fn on_primary(&self) -> bool {
        self.primary.is_some()
    }
}

impl VideoDecoder for FallbackVideoDecoder {
    fn decode(
        &mut self,
        payload: &[u8],
        pts: u64,
        is_keyframe: bool,
    ) -> Result<Vec<DecodedVideoFrame>, CodecError> {
        if let Some(primary) = self.primary.as_mut() {
            match primary.decode(payload, pts, is_keyframe) {
                Err(CodecError::Unsupported(reason)) => {
                    tracing::warn!(
                        "{} decoder unsupported ({}), switching to {}",
                        primary.name(),
                        reason,
                        self.fallback.name()
                    );
                    self.primary = None;
                }
                other => return other,
            }
        }
        self.fallback.decode(payload, pts, is_keyframe)
    }

    fn name(&self) -> &str {
        match &self.primary {
            Some(primary) => primary.name(),
            None => self.fallback.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PixelFormat;

    struct Fixed {
        name: &'static str,
        fail_unsupported: bool,
    }

    impl VideoDecoder for Fixed {
        fn decode(&mut self, _: &[u8], pts: u64, _: bool) -> Result<Vec<DecodedVideoFrame>, CodecError> {
            if self.fail_unsupported {
                return Err(CodecError::Unsupported("no hardware".into()));
            }
            Ok(vec![DecodedVideoFrame {
                pts,
                width: 2,
                height: 2,
                format: PixelFormat::I420,
                pixels: vec![0; 6],
            }])
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn test_switches_on_unsupported() {
        let mut decoder = FallbackVideoDecoder::new(
            Fixed { name: "hw", fail_unsupported: true },
            Fixed { name: "sw", fail_unsupported: false },
        );

        let frames = decoder.decode(&[0], 40, true).unwrap();
        assert_eq!(frames[0].pts, 40);
        assert!(!decoder.on_primary());
        assert_eq!(decoder.name(), "sw");
    }

    #[test]
    fn test_stays_on_primary() {
        let mut decoder = FallbackVideoDecoder::new(
            Fixed { name: "hw", fail_unsupported: false },
            Fixed { name: "sw", fail_unsupported: false },
        );
        decoder.decode(&[0], 0, true).unwrap();
        assert!(decoder.on_primary());
    }
}
