use crate::camera::{sleep_or_cancel, CameraSource};
use crate::codec::Codec;
use crate::config::FeedConfig;
use crate::detector::{DetectionFilter, Detector};
use crate::error::{CameraError, ParkwatchError, Result};
use crate::frame::FrameData;
use crate::occupancy::{OccupancyBoard, OccupancyState, ParkingStatus};
use crate::registry::SourceRegistry;
use crate::render::FrameRenderer;
use crate::zones::{Evaluation, ZoneBook, ZoneEvaluator};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// What a feed does with each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Detect, evaluate zones and publish occupancy
    Detect,
    /// Emit frames only; occupancy is left alone
    Raw,
}

/// One processed frame
#[derive(Debug, Clone)]
pub struct FeedFrame {
    pub frame: FrameData,
    /// `None` for raw feeds and frames whose detection failed
    pub evaluation: Option<Evaluation>,
    /// State published for this frame
    pub state: Option<OccupancyState>,
    pub encoded: Bytes,
}

/// Feed timing and output shape
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub pace_interval: Duration,
    pub read_backoff: Duration,
    pub output_resolution: Option<(u32, u32)>,
}

impl From<&FeedConfig> for FeedSettings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            pace_interval: config.pace_interval(),
            read_backoff: config.read_backoff(),
            output_resolution: Some(config.output_resolution),
        }
    }
}

/// Drives live feeds: read, detect, evaluate, publish, render.
///
/// Cheap to clone; every feed stream holds its own clone.
#[derive(Clone)]
pub struct FeedOrchestrator {
    registry: Arc<SourceRegistry>,
    zones: Arc<ZoneBook>,
    board: Arc<OccupancyBoard>,
    detector: Option<Arc<dyn Detector>>,
    renderer: Arc<dyn FrameRenderer>,
    codec: Arc<dyn Codec>,
    evaluator: ZoneEvaluator,
    filter: DetectionFilter,
    settings: FeedSettings,
}

impl FeedOrchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        zones: Arc<ZoneBook>,
        board: Arc<OccupancyBoard>,
        renderer: Arc<dyn FrameRenderer>,
        codec: Arc<dyn Codec>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            registry,
            zones,
            board,
            detector: None,
            renderer,
            codec,
            evaluator: ZoneEvaluator::default(),
            filter: DetectionFilter::new(config.vehicle_classes.iter().cloned(), config.min_confidence),
            settings: FeedSettings::from(config),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_settings(mut self, settings: FeedSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
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

    /// Processed frames for `source_id` until `token` fires or the stream is
    /// dropped. An unknown source fails here, before any frame is read.
    pub fn frames(
        &self,
        source_id: &str,
        mode: FeedMode,
        token: CancellationToken,
    ) -> Result<impl Stream<Item = FeedFrame> + Send + 'static> {
        let source = self.registry.get(source_id)?;

        let mode = if mode == FeedMode::Detect && self.detector.is_none() {
            warn!("No detector configured; feed for '{}' runs raw", source_id);
            FeedMode::Raw
        } else {
            mode
        };

        info!("Starting {:?} feed for '{}'", mode, source_id);
        let this = self.clone();
        let source_id = source_id.to_string();

        Ok(async_stream::stream! {
            let mut emitted: u64 = 0;

            while let Some(frame) = this.next_frame(&source, &token).await {
                match this.process_frame(&source_id, frame, mode).await {
                    Ok(processed) => {
                        emitted += 1;
                        trace!("Feed '{}' emitting frame {}", source_id, processed.frame.id);
                        yield processed;
                    }
                    Err(e) => warn!("Feed '{}' failed to render frame: {}", source_id, e),
                }

                if sleep_or_cancel(&token, this.settings.pace_interval).await {
                    break;
                }
            }

            info!("Feed for '{}' ended after {} frame(s)", source_id, emitted);
        })
    }

    /// Published occupancy states for `source_id`, without rendering frames.
    /// Frames whose detection failed publish nothing and yield nothing.
    pub fn updates(
        &self,
        source_id: &str,
        token: CancellationToken,
    ) -> Result<impl Stream<Item = OccupancyState> + Send + 'static> {
        if self.detector.is_none() {
            return Err(ParkwatchError::system(format!(
                "No detector configured for occupancy updates of '{}'",
                source_id
            )));
        }
        let source = self.registry.get(source_id)?;

        info!("Starting occupancy updates for '{}'", source_id);
        let this = self.clone();
        let source_id = source_id.to_string();

        Ok(async_stream::stream! {
            while let Some(frame) = this.next_frame(&source, &token).await {
                let (_, _, state) = this.analyze(&source_id, frame, FeedMode::Detect).await;
                if let Some(state) = state {
                    yield state;
                }

                if sleep_or_cancel(&token, this.settings.pace_interval).await {
                    break;
                }
            }

            debug!("Occupancy updates for '{}' ended", source_id);
        })
    }

    /// Next fresh frame, backing off while the source is down. `None` once
    /// `token` fires.
    async fn next_frame(&self, source: &CameraSource, token: &CancellationToken) -> Option<FrameData> {
        while !token.is_cancelled() {
            if let Some(frame) = source.read().await.fresh() {
                return Some(frame);
            }
            if sleep_or_cancel(token, self.settings.read_backoff).await {
                break;
            }
        }
        None
    }

    /// Encoded frames for `source_id`
    pub fn feed(
        &self,
        source_id: &str,
        mode: FeedMode,
        token: CancellationToken,
    ) -> Result<impl Stream<Item = Bytes> + Send + 'static> {
        Ok(self
            .frames(source_id, mode, token)?
            .map(|processed| processed.encoded))
    }

    /// Resize, detect, evaluate, publish and render one frame.
    ///
    /// Detector errors are logged and leave the published occupancy as it
    /// was; the frame is still rendered.
    pub async fn process_frame(&self, source_id: &str, frame: FrameData, mode: FeedMode) -> Result<FeedFrame> {
        let (frame, evaluation, state) = self.analyze(source_id, frame, mode).await;

        let zones = self.zones.zones(source_id);
        let encoded = self.renderer.render(&frame, &zones, evaluation.as_ref())?;
        debug!(
            "Frame {} for '{}' rendered ({} bytes)",
            frame.id,
            source_id,
            encoded.len()
        );

        Ok(FeedFrame {
            frame,
            evaluation,
            state,
            encoded,
        })
    }

    /// Resize, then in detect mode run detection and publish the evaluation
    async fn analyze(
        &self,
        source_id: &str,
        frame: FrameData,
        mode: FeedMode,
    ) -> (FrameData, Option<Evaluation>, Option<OccupancyState>) {
        let frame = self.fit_output(frame);

        let zones = self.zones.zones(source_id);
        let (evaluation, state) = match (mode, &self.detector) {
            (FeedMode::Detect, Some(detector)) => match detector.infer(&frame).await {
                Ok(detections) => {
                    let detections = self.filter.apply(detections);
                    let evaluation = self.evaluator.evaluate(&detections, &zones);
                    let state = OccupancyState::from_evaluation(source_id, &evaluation);
                    let previous = self.board.publish(state.clone());

                    if previous.as_ref().map(|p| p.occupied_count) != Some(state.occupied_count) {
                        info!(
                            "'{}': {}/{} spaces occupied",
                            source_id,
                            state.occupied_count,
                            zones.len()
                        );
                    }

                    (Some(evaluation), Some(state))
                }
                Err(e) => {
                    warn!("Detection failed for '{}' frame {}: {}", source_id, frame.id, e);
                    (None, None)
                }
            },
            _ => (None, None),
        };

        (frame, evaluation, state)
    }

    fn fit_output(&self, frame: FrameData) -> FrameData {
        match self.settings.output_resolution {
            Some((width, height)) => frame.resized(width, height),
            None => frame,
        }
    }

    /// One JPEG from `source_id` at the output resolution: a fresh read,
    /// else the last good frame
    pub async fn snapshot(&self, source_id: &str) -> Result<Bytes> {
        let source = self.registry.get(source_id)?;
        let frame = latest_frame(&source).await.ok_or_else(|| CameraError::NoFrame {
            source_id: source_id.to_string(),
        })?;

        self.codec.encode(&self.fit_output(frame).image)
    }

    /// Parking summary from the current zone set and latest state
    pub fn status(&self, source_id: &str) -> ParkingStatus {
        let zones = self.zones.zones(source_id);
        let state = self.board.get(source_id);
        ParkingStatus::build(source_id, &zones, state.as_ref())
    }

    /// Wait up to `wait` for a frame, run one detection cycle on it and
    /// return the resulting status
    pub async fn evaluate_once(&self, source_id: &str, wait: Duration) -> Result<ParkingStatus> {
        let source = self.registry.get(source_id)?;
        let deadline = tokio::time::Instant::now() + wait;

        let frame = loop {
            if let Some(frame) = source.read().await.fresh() {
                break frame;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CameraError::NoFrame {
                    source_id: source_id.to_string(),
                }
                .into());
            }
            tokio::time::sleep(self.settings.read_backoff).await;
        };

        self.process_frame(source_id, frame, FeedMode::Detect).await?;
        Ok(self.status(source_id))
    }
}

async fn latest_frame(source: &CameraSource) -> Option<FrameData> {
    source.read().await.into_frame().or_else(|| source.last_frame())
}
