use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParkwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Zone error: {0}")]
    Zone(#[from] ZoneError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Acquisition failures. These stay inside the capture path and are reported
/// to callers as unsuccessful reads, never as `read()` errors.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open {url}: {details}")]
    Open { url: String, details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Digest authentication failed for {url}: {details}")]
    DigestAuth { url: String, details: String },

    #[error("Structured decoder unavailable: {details}")]
    DecoderUnavailable { details: String },

    #[error("No frame available for source {source_id}")]
    NoFrame { source_id: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown camera source '{0}'")]
    UnknownSource(String),

    #[error("Camera source '{0}' is live and cannot be re-registered with a different descriptor")]
    AlreadyLive(String),

    #[error("Invalid camera source id: {0}")]
    InvalidId(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ZoneError {
    #[error("Zone '{zone_id}' has {points} points, a polygon needs at least 3")]
    TooFewPoints { zone_id: String, points: usize },

    #[error("Zone '{zone_id}' has a non-finite coordinate")]
    NonFiniteCoordinate { zone_id: String },

    #[error("Zone id must not be empty")]
    EmptyId,

    #[error("Duplicate zone id '{0}'")]
    DuplicateId(String),
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Inference service returned status {0}")]
    Status(u16),

    #[error("Frame encoding for inference failed: {details}")]
    Encoding { details: String },
}

impl ParkwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParkwatchError>;
