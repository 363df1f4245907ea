use crate::camera::{AuthMode, SourceDescriptor};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ParkwatchConfig {
    pub capture: CaptureConfig,
    pub feed: FeedConfig,
    pub detector: DetectorConfig,
    pub zones: ZonesConfig,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Timeout for a single on-demand snapshot request
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,

    /// Timeout for opening a raw MJPEG connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single chunk read on an open raw connection
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,

    /// Scan iterations the manual framer may spend per call
    #[serde(default = "default_max_scan_iterations")]
    pub max_scan_iterations: u32,

    /// Sleep after a failed manual fallback read
    #[serde(default = "default_fallback_retry_ms")]
    pub fallback_retry_ms: u64,

    /// Sleep after any capture iteration that produced no frame
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Maximum wait for one sample from the structured decoder
    #[serde(default = "default_structured_pull_timeout_ms")]
    pub structured_pull_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedConfig {
    /// Delay between emitted frames
    #[serde(default = "default_pace_interval_ms")]
    pub pace_interval_ms: u64,

    /// Delay before retrying a read that produced no frame
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,

    /// Frame size (width, height) used for detection and output
    #[serde(default = "default_output_resolution")]
    pub output_resolution: (u32, u32),

    /// Detection classes that can occupy a zone
    #[serde(default = "default_vehicle_classes")]
    pub vehicle_classes: Vec<String>,

    /// Detections below this confidence are ignored
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// JPEG quality for emitted frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Base URL of the inference service; frames are not analyzed when unset
    pub endpoint: Option<String>,

    #[serde(default = "default_detector_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZonesConfig {
    /// JSON document holding zone sets keyed by camera id
    #[serde(default = "default_zones_path")]
    pub path: String,
}

#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CameraEntry {
    pub id: String,

    /// Device index (e.g. "0") or stream/snapshot URL
    pub url: String,

    #[serde(default)]
    pub requires_auth: bool,

    #[serde(default)]
    pub auth_mode: AuthMode,

    pub user: Option<String>,

    pub password: Option<String>,
}

impl std::fmt::Debug for CameraEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraEntry")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("requires_auth", &self.requires_auth)
            .field("auth_mode", &self.auth_mode)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl CameraEntry {
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            url_or_index: self.url.clone(),
            auth_mode: self.auth_mode,
            user: self.user.clone(),
            password: self.password.clone(),
            requires_auth: self.requires_auth,
        }
    }
}

impl CaptureConfig {
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn fallback_retry(&self) -> Duration {
        Duration::from_millis(self.fallback_retry_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn structured_pull_timeout(&self) -> Duration {
        Duration::from_millis(self.structured_pull_timeout_ms)
    }
}

impl FeedConfig {
    pub fn pace_interval(&self) -> Duration {
        Duration::from_millis(self.pace_interval_ms)
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }
}

impl DetectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ParkwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("parkwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("capture.snapshot_timeout_ms", default_snapshot_timeout_ms() as i64)?
            .set_default("capture.connect_timeout_ms", default_connect_timeout_ms() as i64)?
            .set_default("capture.chunk_timeout_ms", default_chunk_timeout_ms() as i64)?
            .set_default("capture.max_scan_iterations", default_max_scan_iterations() as i64)?
            .set_default("capture.fallback_retry_ms", default_fallback_retry_ms() as i64)?
            .set_default("capture.idle_interval_ms", default_idle_interval_ms() as i64)?
            .set_default(
                "capture.structured_pull_timeout_ms",
                default_structured_pull_timeout_ms() as i64,
            )?
            .set_default("feed.pace_interval_ms", default_pace_interval_ms() as i64)?
            .set_default("feed.read_backoff_ms", default_read_backoff_ms() as i64)?
            .set_default(
                "feed.output_resolution",
                vec![
                    default_output_resolution().0 as i64,
                    default_output_resolution().1 as i64,
                ],
            )?
            .set_default("feed.vehicle_classes", default_vehicle_classes())?
            .set_default("feed.min_confidence", default_min_confidence() as f64)?
            .set_default("feed.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("detector.timeout_ms", default_detector_timeout_ms() as i64)?
            .set_default("zones.path", default_zones_path())?
            .set_default("cameras", Vec::<String>::new())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Nested keys use a double underscore: PARKWATCH_FEED__JPEG_QUALITY
            .add_source(
                Environment::with_prefix("PARKWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ParkwatchConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} cameras)",
            config.cameras.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        for (name, value) in [
            ("snapshot_timeout_ms", capture.snapshot_timeout_ms),
            ("connect_timeout_ms", capture.connect_timeout_ms),
            ("chunk_timeout_ms", capture.chunk_timeout_ms),
            ("structured_pull_timeout_ms", capture.structured_pull_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Capture {} must be greater than 0",
                    name
                )));
            }
        }

        if capture.max_scan_iterations == 0 {
            return Err(ConfigError::Message(
                "Capture max_scan_iterations must be greater than 0".to_string(),
            ));
        }

        if self.feed.output_resolution.0 == 0 || self.feed.output_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Feed output resolution must be greater than 0".to_string(),
            ));
        }

        if self.feed.jpeg_quality == 0 || self.feed.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Feed jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.feed.min_confidence) {
            return Err(ConfigError::Message(
                "Feed min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.detector.endpoint.is_some() && self.detector.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Detector timeout_ms must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Camera id must not be empty".to_string(),
                ));
            }
            if camera.url.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "Camera '{}' has an empty url",
                    camera.id
                )));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate camera id '{}'",
                    camera.id
                )));
            }
        }

        Ok(())
    }
}

impl Default for ParkwatchConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            feed: FeedConfig::default(),
            detector: DetectorConfig {
                endpoint: None,
                timeout_ms: default_detector_timeout_ms(),
            },
            zones: ZonesConfig {
                path: default_zones_path(),
            },
            cameras: Vec::new(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            max_scan_iterations: default_max_scan_iterations(),
            fallback_retry_ms: default_fallback_retry_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            structured_pull_timeout_ms: default_structured_pull_timeout_ms(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            pace_interval_ms: default_pace_interval_ms(),
            read_backoff_ms: default_read_backoff_ms(),
            output_resolution: default_output_resolution(),
            vehicle_classes: default_vehicle_classes(),
            min_confidence: default_min_confidence(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

// Default value functions
fn default_snapshot_timeout_ms() -> u64 {
    2_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_chunk_timeout_ms() -> u64 {
    10_000
}
fn default_max_scan_iterations() -> u32 {
    100
}
fn default_fallback_retry_ms() -> u64 {
    1_000
}
fn default_idle_interval_ms() -> u64 {
    10
}
fn default_structured_pull_timeout_ms() -> u64 {
    5_000
}

fn default_pace_interval_ms() -> u64 {
    10
}
fn default_read_backoff_ms() -> u64 {
    10
}
fn default_output_resolution() -> (u32, u32) {
    (1020, 500)
}
fn default_vehicle_classes() -> Vec<String> {
    ["car", "truck", "bus", "motorcycle"]
        .iter()
        .map(|class| class.to_string())
        .collect()
}
fn default_min_confidence() -> f32 {
    0.25
}
fn default_jpeg_quality() -> u8 {
    80
}

fn default_detector_timeout_ms() -> u64 {
    30_000
}

fn default_zones_path() -> String {
    "zones.json".to_string()
}
