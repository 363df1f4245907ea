//! Manual MJPEG demultiplexing for streams no structured decoder can open.

mod scanner;
#[cfg(test)]
mod tests;

pub use scanner::{MarkerScanner, END_MARKER, START_MARKER};

use crate::codec::Codec;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// An open raw byte stream.
#[async_trait]
pub trait ChunkStream: Send {
    /// Next chunk of bytes; `Ok(None)` once the peer closed the stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Opens raw byte streams for one camera.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChunkStream>>;

    /// Human readable target, used in logs
    fn describe(&self) -> String;
}

/// Largest partial frame held before the connection is dropped
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Pulls chunks from a raw connection and emits one decoded frame per call.
pub struct FrameFramer {
    connector: Arc<dyn StreamConnector>,
    connection: Option<Box<dyn ChunkStream>>,
    scanner: MarkerScanner,
    codec: Arc<dyn Codec>,
    max_iterations: u32,
    max_frame_bytes: usize,
}

impl FrameFramer {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        codec: Arc<dyn Codec>,
        max_iterations: u32,
    ) -> Self {
        Self {
            connector,
            connection: None,
            scanner: MarkerScanner::new(),
            codec,
            max_iterations: max_iterations.max(1),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes.max(END_MARKER.len() + START_MARKER.len());
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn buffered(&self) -> &[u8] {
        self.scanner.buffered()
    }

    /// Read the next decodable frame.
    ///
    /// Never fails: connection problems drop the connection and clear the
    /// buffer, so the next call reconnects. `None` means no frame this call.
    pub async fn read_frame(&mut self) -> Option<RgbImage> {
        if self.connection.is_none() {
            match self.connector.connect().await {
                Ok(connection) => {
                    info!("Raw MJPEG connection established: {}", self.connector.describe());
                    self.connection = Some(connection);
                }
                Err(e) => {
                    warn!("Raw MJPEG connection to {} failed: {}", self.connector.describe(), e);
                    return None;
                }
            }
        }

        for _ in 0..self.max_iterations {
            while let Some(candidate) = self.scanner.next_candidate() {
                match self.codec.decode(&candidate) {
                    Some(image) => return Some(image),
                    None => trace!("Skipping undecodable candidate ({} bytes)", candidate.len()),
                }
            }

            if self.scanner.buffered().len() > self.max_frame_bytes {
                warn!(
                    "Partial frame from {} exceeds {} bytes, reconnecting",
                    self.connector.describe(),
                    self.max_frame_bytes
                );
                self.invalidate();
                return None;
            }

            let connection = self.connection.as_mut()?;
            match connection.next_chunk().await {
                Ok(Some(chunk)) => self.scanner.extend(&chunk),
                Ok(None) => {
                    warn!("Raw MJPEG stream closed by {}", self.connector.describe());
                    self.invalidate();
                    return None;
                }
                Err(e) => {
                    warn!("Error reading raw MJPEG chunk from {}: {}", self.connector.describe(), e);
                    self.invalidate();
                    return None;
                }
            }
        }

        if self.scanner.has_partial_frame() {
            debug!(
                "No complete frame after {} scan iterations, {} bytes buffered",
                self.max_iterations,
                self.scanner.buffered().len()
            );
        } else {
            warn!(
                "No frame markers from {} after {} scan iterations, reconnecting",
                self.connector.describe(),
                self.max_iterations
            );
            self.invalidate();
        }

        None
    }

    fn invalidate(&mut self) {
        self.connection = None;
        self.scanner.clear();
    }
}
