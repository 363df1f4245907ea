use crate::error::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use tracing::trace;

/// Image codec capability: encoded bytes in, pixels out, and back.
pub trait Codec: Send + Sync {
    /// Decode an encoded image. Undecodable payloads yield `None`.
    fn decode(&self, bytes: &[u8]) -> Option<RgbImage>;

    /// Encode pixels for transport (JPEG for every built-in codec).
    fn encode(&self, image: &RgbImage) -> Result<Bytes>;
}

/// JPEG codec over the `image` crate. Decoding accepts any format `image`
/// can sniff, since snapshot endpoints are not always JPEG.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(80)
    }
}

impl Codec for JpegCodec {
    fn decode(&self, bytes: &[u8]) -> Option<RgbImage> {
        match image::load_from_memory(bytes) {
            Ok(decoded) => Some(decoded.to_rgb8()),
            Err(e) => {
                trace!("Discarding undecodable payload ({} bytes): {}", bytes.len(), e);
                None
            }
        }
    }

    fn encode(&self, image: &RgbImage) -> Result<Bytes> {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
        Ok(Bytes::from(buf))
    }
}
