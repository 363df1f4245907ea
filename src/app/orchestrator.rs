use super::types::{ComponentState, ShutdownReason};
use crate::camera::DefaultSourceFactory;
use crate::codec::{Codec, JpegCodec};
use crate::config::ParkwatchConfig;
use crate::detector::RemoteDetector;
use crate::error::Result;
use crate::feed::FeedOrchestrator;
use crate::occupancy::OccupancyBoard;
use crate::registry::SourceRegistry;
use crate::render::PassthroughRenderer;
use crate::zones::{JsonFileZoneStore, ZoneBook};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wires configuration into the registry, zone book, occupancy board and
/// feed orchestrator, and owns their lifecycle.
pub struct ParkwatchApp {
    pub(super) config: ParkwatchConfig,
    pub(super) registry: Arc<SourceRegistry>,
    pub(super) zones: Arc<ZoneBook>,
    pub(super) board: Arc<OccupancyBoard>,
    pub(super) feeds: FeedOrchestrator,

    // Lifecycle management
    pub(super) monitors: Vec<JoinHandle<()>>,
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ParkwatchApp {
    /// Build every component from `config` and register its cameras.
    /// Sources themselves are created lazily on first use.
    pub async fn new(config: ParkwatchConfig) -> Result<Self> {
        let codec: Arc<dyn Codec> = Arc::new(JpegCodec::new(config.feed.jpeg_quality));

        let registry = Arc::new(SourceRegistry::new(Arc::new(DefaultSourceFactory::new(
            config.capture.clone(),
            Arc::clone(&codec),
        ))));
        for camera in &config.cameras {
            registry.register(&camera.id, camera.descriptor())?;
        }

        let zones = Arc::new(ZoneBook::new(Arc::new(JsonFileZoneStore::new(
            &config.zones.path,
        ))));
        let board = Arc::new(OccupancyBoard::new());

        let mut feeds = FeedOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&zones),
            Arc::clone(&board),
            Arc::new(PassthroughRenderer::new(Arc::clone(&codec))),
            Arc::clone(&codec),
            &config.feed,
        );

        match &config.detector.endpoint {
            Some(endpoint) => {
                info!("Using inference service at {}", endpoint);
                feeds = feeds.with_detector(Arc::new(RemoteDetector::new(
                    endpoint.clone(),
                    config.detector.timeout(),
                    Arc::clone(&codec),
                )?));
            }
            None => warn!("No detector endpoint configured; occupancy will not be evaluated"),
        }

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            registry,
            zones,
            board,
            feeds,
            monitors: Vec::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ParkwatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn zones(&self) -> &Arc<ZoneBook> {
        &self.zones
    }

    pub fn board(&self) -> &Arc<OccupancyBoard> {
        &self.board
    }

    pub fn feeds(&self) -> &FeedOrchestrator {
        &self.feeds
    }

    /// Token cancelled when the app shuts down. Cancelling it also ends
    /// [`run`](Self::run).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
