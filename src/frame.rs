use image::{imageops, RgbImage};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// A decoded camera frame.
///
/// Pixels sit behind an `Arc` and are never mutated after construction, so a
/// clone handed to a reader is a stable copy even while the capture task keeps
/// publishing newer frames.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-source sequence number
    pub id: u64,
    /// Timestamp when the frame was acquired
    pub timestamp: SystemTime,
    /// Decoded RGB pixels
    pub image: Arc<RgbImage>,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        Self {
            id,
            timestamp,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Check if frame is older than specified duration
    pub fn is_older_than(&self, duration: Duration) -> bool {
        SystemTime::now()
            .duration_since(self.timestamp)
            .map(|age| age > duration)
            .unwrap_or(false)
    }

    /// Return a frame scaled to exactly `width` x `height`, keeping id and
    /// timestamp. Frames already at that size are returned as-is.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.width() == width && self.height() == height {
            return self.clone();
        }

        let scaled = imageops::resize(
            self.image.as_ref(),
            width,
            height,
            imageops::FilterType::Triangle,
        );

        Self {
            id: self.id,
            timestamp: self.timestamp,
            image: Arc::new(scaled),
        }
    }
}
