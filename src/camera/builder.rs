use super::capture::{CaptureLoop, CaptureTimings};
use super::descriptor::SourceDescriptor;
use super::http::HttpStreamConnector;
use super::mode::AcquisitionMode;
use super::snapshot::{HttpSnapshotFetcher, OnDemandStrategy, SnapshotFetcher};
use super::source::{Acquisition, CameraSource, FrameSlot, SourceCounters};
use super::structured::{default_structured_opener, StructuredOpener};
use crate::codec::{Codec, JpegCodec};
use crate::config::CaptureConfig;
use crate::error::{ParkwatchError, Result};
use crate::framer::StreamConnector;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builder for [`CameraSource`]. Transport pieces default to the HTTP and
/// GStreamer implementations and can be swapped individually.
pub struct CameraSourceBuilder {
    id: String,
    descriptor: Option<SourceDescriptor>,
    capture: CaptureConfig,
    codec: Option<Arc<dyn Codec>>,
    opener: Option<Arc<dyn StructuredOpener>>,
    connector: Option<Arc<dyn StreamConnector>>,
    fetcher: Option<Arc<dyn SnapshotFetcher>>,
}

impl CameraSourceBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            descriptor: None,
            capture: CaptureConfig::default(),
            codec: None,
            opener: None,
            connector: None,
            fetcher: None,
        }
    }

    pub fn descriptor(mut self, descriptor: SourceDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn capture_config(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn structured_opener(mut self, opener: Arc<dyn StructuredOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn stream_connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn snapshot_fetcher(mut self, fetcher: Arc<dyn SnapshotFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Classify, bind credentials and start acquisition. Continuous modes
    /// spawn their capture task here, so a tokio runtime must be running.
    pub fn build(self) -> Result<CameraSource> {
        let descriptor = self.descriptor.ok_or_else(|| {
            ParkwatchError::system(format!("Camera '{}' needs a source descriptor", self.id))
        })?;

        let mode = AcquisitionMode::classify(&descriptor.url_or_index);
        let auth = mode.resolve_auth(&descriptor);
        let codec: Arc<dyn Codec> = match self.codec {
            Some(codec) => codec,
            None => Arc::new(JpegCodec::default()),
        };

        info!(
            "Building camera source '{}' as {} (auth: {})",
            self.id,
            mode,
            if auth.is_none() { "none" } else { "bound" }
        );

        let slot = Arc::new(FrameSlot::default());
        let counters = Arc::new(SourceCounters::default());
        let token = CancellationToken::new();

        let acquisition = match &mode {
            AcquisitionMode::OnDemand { url } => {
                let fetcher: Arc<dyn SnapshotFetcher> = match self.fetcher {
                    Some(fetcher) => fetcher,
                    None => Arc::new(HttpSnapshotFetcher::new(
                        url.clone(),
                        auth.clone(),
                        self.capture.snapshot_timeout(),
                    )?),
                };
                Acquisition::OnDemand(OnDemandStrategy::new(fetcher, codec))
            }
            AcquisitionMode::LocalDevice { .. } | AcquisitionMode::Continuous { .. } => {
                let connector = match (&mode, self.connector) {
                    (AcquisitionMode::LocalDevice { .. }, _) => None,
                    (_, Some(connector)) => Some(connector),
                    (_, None) => match mode.url() {
                        Some(url) => Some(Arc::new(HttpStreamConnector::new(
                            url,
                            auth.clone(),
                            self.capture.connect_timeout(),
                            self.capture.chunk_timeout(),
                        )?) as Arc<dyn StreamConnector>),
                        None => None,
                    },
                };
                let opener = self.opener.unwrap_or_else(|| {
                    default_structured_opener(self.capture.structured_pull_timeout())
                });

                let capture = CaptureLoop::new(
                    self.id.clone(),
                    mode.clone(),
                    auth.clone(),
                    opener,
                    connector,
                    codec,
                    Arc::clone(&slot),
                    Arc::clone(&counters),
                    token.clone(),
                    CaptureTimings {
                        fallback_retry: self.capture.fallback_retry(),
                        idle_interval: self.capture.idle_interval(),
                        max_scan_iterations: self.capture.max_scan_iterations,
                    },
                );

                Acquisition::Continuous {
                    task: Mutex::new(Some(capture.spawn()?)),
                }
            }
        };

        Ok(CameraSource::from_parts(
            self.id,
            descriptor,
            mode,
            auth,
            slot,
            counters,
            token,
            acquisition,
        ))
    }
}

/// Creates sources for the registry.
pub trait SourceFactory: Send + Sync {
    fn create(&self, id: &str, descriptor: &SourceDescriptor) -> Result<CameraSource>;
}

/// Factory producing sources with the default transports
pub struct DefaultSourceFactory {
    capture: CaptureConfig,
    codec: Arc<dyn Codec>,
}

impl DefaultSourceFactory {
    pub fn new(capture: CaptureConfig, codec: Arc<dyn Codec>) -> Self {
        Self { capture, codec }
    }
}

impl SourceFactory for DefaultSourceFactory {
    fn create(&self, id: &str, descriptor: &SourceDescriptor) -> Result<CameraSource> {
        CameraSourceBuilder::new(id)
            .descriptor(descriptor.clone())
            .capture_config(self.capture.clone())
            .codec(Arc::clone(&self.codec))
            .build()
    }
}
