use crate::codec::Codec;
use crate::error::{DetectorError, Result};
use crate::frame::FrameData;
use crate::zones::Point;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn centroid(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }
}

/// Object detector: frame in, detections out.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn infer(&self, frame: &FrameData) -> Result<Vec<Detection>>;
}

/// Keeps detections of the wanted classes at or above a confidence floor
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    classes: HashSet<String>,
    min_confidence: f32,
}

impl DetectionFilter {
    pub fn new<I, S>(classes: I, min_confidence: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
            min_confidence,
        }
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence >= self.min_confidence && self.classes.contains(&detection.class)
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Detector backed by an HTTP inference service.
///
/// Each frame is posted as a JPEG in the `image` part of a multipart form;
/// the service answers `{"detections": [{class, confidence, bbox}]}`.
pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
    codec: Arc<dyn Codec>,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, codec: Arc<dyn Codec>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DetectorError::from)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            codec,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, jpeg: Vec<u8>) -> std::result::Result<Vec<Detection>, DetectorError> {
        let form = Form::new().part(
            "image",
            Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")?,
        );

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(DetectorError::Status(response.status().as_u16()));
        }

        let parsed: InferenceResponse = response.json().await?;
        Ok(parsed.detections)
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    async fn infer(&self, frame: &FrameData) -> Result<Vec<Detection>> {
        let jpeg = self
            .codec
            .encode(&frame.image)
            .map_err(|e| DetectorError::Encoding {
                details: e.to_string(),
            })?;

        trace!("Posting frame {} ({} bytes) for inference", frame.id, jpeg.len());
        let detections = self.request(jpeg.to_vec()).await?;
        debug!("Frame {}: {} detection(s)", frame.id, detections.len());

        Ok(detections)
    }
}
