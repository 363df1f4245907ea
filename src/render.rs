use crate::codec::Codec;
use crate::error::Result;
use crate::frame::FrameData;
use crate::zones::{Evaluation, Zone};
use bytes::Bytes;
use std::sync::Arc;

/// Turns a processed frame into the bytes sent downstream.
pub trait FrameRenderer: Send + Sync {
    /// `evaluation` is `None` for raw feeds
    fn render(&self, frame: &FrameData, zones: &[Zone], evaluation: Option<&Evaluation>) -> Result<Bytes>;
}

/// Encodes the frame unchanged
pub struct PassthroughRenderer {
    codec: Arc<dyn Codec>,
}

impl PassthroughRenderer {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }
}

impl FrameRenderer for PassthroughRenderer {
    fn render(&self, frame: &FrameData, _zones: &[Zone], _evaluation: Option<&Evaluation>) -> Result<Bytes> {
        self.codec.encode(&frame.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JpegCodec;
    use image::{Rgb, RgbImage};
    use std::time::SystemTime;

    #[test]
    fn test_passthrough_encodes_jpeg() {
        let renderer = PassthroughRenderer::new(Arc::new(JpegCodec::default()));
        let frame = FrameData::new(3, SystemTime::now(), RgbImage::from_pixel(16, 9, Rgb([1, 2, 3])));

        let bytes = renderer.render(&frame, &[], None).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }
}
