use super::*;
use crate::camera::{CameraSource, CameraSourceBuilder, SnapshotFetcher, SourceDescriptor, SourceFactory};
use crate::codec::{Codec, JpegCodec};
use crate::config::FeedConfig;
use crate::detector::{BoundingBox, Detection, DetectionFilter, Detector};
use crate::error::{CameraError, DetectorError, ParkwatchError, RegistryError, Result};
use crate::frame::FrameData;
use crate::occupancy::OccupancyBoard;
use crate::registry::SourceRegistry;
use crate::render::{FrameRenderer, PassthroughRenderer};
use crate::zones::{Evaluation, MemoryZoneStore, Point, Zone, ZoneBook};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

fn jpeg() -> Bytes {
    JpegCodec::default()
        .encode(&RgbImage::from_pixel(320, 200, Rgb([90, 90, 90])))
        .unwrap()
}

/// Succeeds while `online`, fails otherwise
struct ToggleFetcher {
    online: AtomicBool,
}

#[async_trait]
impl SnapshotFetcher for ToggleFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        if self.online.load(Ordering::SeqCst) {
            Ok(jpeg())
        } else {
            Err(CameraError::Status {
                url: "toggle".to_string(),
                status: 504,
            }
            .into())
        }
    }

    fn describe(&self) -> String {
        "toggle".to_string()
    }
}

/// Counts render calls and returns an empty payload
#[derive(Default)]
struct CountingRenderer {
    calls: AtomicUsize,
}

impl FrameRenderer for CountingRenderer {
    fn render(&self, _frame: &FrameData, _zones: &[Zone], _evaluation: Option<&Evaluation>) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::new())
    }
}

struct SnapshotFactory {
    fetcher: Arc<ToggleFetcher>,
}

impl SourceFactory for SnapshotFactory {
    fn create(&self, id: &str, descriptor: &SourceDescriptor) -> Result<CameraSource> {
        CameraSourceBuilder::new(id)
            .descriptor(descriptor.clone())
            .snapshot_fetcher(self.fetcher.clone())
            .build()
    }
}

struct FixedDetector {
    detections: Vec<Detection>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FixedDetector {
    fn new(detections: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            detections,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Detector for FixedDetector {
    async fn infer(&self, _frame: &FrameData) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DetectorError::Status(500).into());
        }
        Ok(self.detections.clone())
    }
}

fn square(id: &str, space_number: u32, x: f64, size: f64) -> Zone {
    Zone::new(
        id,
        space_number,
        vec![
            Point::new(x, 0.0),
            Point::new(x + size, 0.0),
            Point::new(x + size, size),
            Point::new(x, size),
        ],
    )
}

fn car_in_first_zone() -> Detection {
    Detection::new("car", 0.9, BoundingBox::new(40.0, 40.0, 60.0, 60.0))
}

struct Harness {
    orchestrator: FeedOrchestrator,
    fetcher: Arc<ToggleFetcher>,
    board: Arc<OccupancyBoard>,
}

async fn harness(detector: Option<Arc<FixedDetector>>) -> Harness {
    let fetcher = Arc::new(ToggleFetcher {
        online: AtomicBool::new(true),
    });
    let registry = Arc::new(SourceRegistry::new(Arc::new(SnapshotFactory {
        fetcher: fetcher.clone(),
    })));
    registry
        .register("north", SourceDescriptor::open("http://cam.local/snapshot.jpg"))
        .unwrap();

    let zones = Arc::new(ZoneBook::new(Arc::new(MemoryZoneStore::new())));
    zones
        .sync("north", vec![square("Z1", 1, 0.0, 100.0), square("Z2", 2, 200.0, 100.0)])
        .await
        .unwrap();

    let board = Arc::new(OccupancyBoard::new());
    let codec: Arc<dyn Codec> = Arc::new(JpegCodec::default());
    let mut orchestrator = FeedOrchestrator::new(
        registry,
        zones,
        board.clone(),
        Arc::new(PassthroughRenderer::new(codec.clone())),
        codec,
        &FeedConfig::default(),
    )
    .with_settings(FeedSettings {
        pace_interval: Duration::from_millis(1),
        read_backoff: Duration::from_millis(1),
        output_resolution: None,
    });

    if let Some(detector) = detector {
        orchestrator = orchestrator.with_detector(detector);
    }

    Harness {
        orchestrator,
        fetcher,
        board,
    }
}

fn test_frame() -> FrameData {
    FrameData::new(0, SystemTime::now(), RgbImage::from_pixel(320, 200, Rgb([0, 0, 0])))
}

#[tokio::test]
async fn test_detect_publishes_occupancy() {
    let h = harness(Some(FixedDetector::new(vec![car_in_first_zone()]))).await;

    let processed = h
        .orchestrator
        .process_frame("north", test_frame(), FeedMode::Detect)
        .await
        .unwrap();

    let evaluation = processed.evaluation.unwrap();
    assert!(evaluation.is_occupied("Z1"));
    assert!(!evaluation.is_occupied("Z2"));
    assert_eq!(evaluation.occupied_count(), 1);
    assert_eq!(&processed.encoded[..2], &[0xFF, 0xD8]);

    let state = h.board.get("north").unwrap();
    assert_eq!(state.occupied_count, 1);
    assert!(state.is_occupied("Z1"));
    assert!(!state.is_occupied("Z2"));
}

#[tokio::test]
async fn test_filtered_classes_do_not_occupy() {
    let person = Detection::new("person", 0.99, BoundingBox::new(40.0, 40.0, 60.0, 60.0));
    let weak_car = Detection::new("car", 0.1, BoundingBox::new(240.0, 40.0, 260.0, 60.0));
    let h = harness(Some(FixedDetector::new(vec![person, weak_car]))).await;

    h.orchestrator
        .process_frame("north", test_frame(), FeedMode::Detect)
        .await
        .unwrap();

    assert_eq!(h.board.get("north").unwrap().occupied_count, 0);
}

#[tokio::test]
async fn test_custom_filter() {
    let person = Detection::new("person", 0.99, BoundingBox::new(40.0, 40.0, 60.0, 60.0));
    let h = harness(Some(FixedDetector::new(vec![person]))).await;
    let orchestrator = h
        .orchestrator
        .clone()
        .with_filter(DetectionFilter::new(["person"], 0.5));

    orchestrator
        .process_frame("north", test_frame(), FeedMode::Detect)
        .await
        .unwrap();

    assert!(h.board.get("north").unwrap().is_occupied("Z1"));
}

#[tokio::test]
async fn test_detector_failure_keeps_previous_state() {
    let detector = FixedDetector::new(vec![car_in_first_zone()]);
    let h = harness(Some(detector.clone())).await;

    h.orchestrator
        .process_frame("north", test_frame(), FeedMode::Detect)
        .await
        .unwrap();
    let before = h.board.get("north").unwrap();

    detector.failing.store(true, Ordering::SeqCst);
    let processed = h
        .orchestrator
        .process_frame("north", test_frame(), FeedMode::Detect)
        .await
        .unwrap();

    assert!(processed.evaluation.is_none());
    assert!(!processed.encoded.is_empty());
    assert_eq!(h.board.get("north").unwrap(), before);
}

#[tokio::test]
async fn test_raw_mode_skips_detection() {
    let detector = FixedDetector::new(vec![car_in_first_zone()]);
    let h = harness(Some(detector.clone())).await;

    let processed = h
        .orchestrator
        .process_frame("north", test_frame(), FeedMode::Raw)
        .await
        .unwrap();

    assert!(processed.evaluation.is_none());
    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    assert!(h.board.get("north").is_none());
}

#[tokio::test]
async fn test_frames_are_resized_before_detection() {
    let h = harness(None).await;
    let orchestrator = h.orchestrator.clone().with_settings(FeedSettings {
        pace_interval: Duration::from_millis(1),
        read_backoff: Duration::from_millis(1),
        output_resolution: Some((64, 32)),
    });

    let processed = orchestrator
        .process_frame("north", test_frame(), FeedMode::Raw)
        .await
        .unwrap();

    assert_eq!((processed.frame.width(), processed.frame.height()), (64, 32));
}

#[tokio::test]
async fn test_feed_emits_frames_until_cancelled() {
    let h = harness(Some(FixedDetector::new(vec![car_in_first_zone()]))).await;
    let token = CancellationToken::new();

    let stream = h
        .orchestrator
        .feed("north", FeedMode::Detect, token.clone())
        .unwrap();
    futures::pin_mut!(stream);

    for _ in 0..3 {
        let jpeg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
    assert_eq!(h.board.get("north").unwrap().occupied_count, 1);

    token.cancel();
    let mut remaining = 0;
    while tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .is_some()
    {
        remaining += 1;
    }
    assert!(remaining <= 1);
}

#[tokio::test]
async fn test_feed_backs_off_while_source_is_down() {
    let h = harness(None).await;
    h.fetcher.online.store(false, Ordering::SeqCst);
    let token = CancellationToken::new();

    let stream = h.orchestrator.feed("north", FeedMode::Raw, token.clone()).unwrap();
    futures::pin_mut!(stream);

    let nothing = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(nothing.is_err());

    h.fetcher.online.store(true, Ordering::SeqCst);
    let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap();
    assert!(frame.is_some());

    token.cancel();
}

#[tokio::test]
async fn test_feed_without_detector_runs_raw() {
    let h = harness(None).await;
    let token = CancellationToken::new();

    let stream = h
        .orchestrator
        .frames("north", FeedMode::Detect, token.clone())
        .unwrap();
    futures::pin_mut!(stream);

    let processed = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(processed.evaluation.is_none());
    assert!(h.board.get("north").is_none());

    token.cancel();
}

#[tokio::test]
async fn test_updates_publish_occupancy_without_rendering() {
    let h = harness(None).await;
    let detector = FixedDetector::new(vec![car_in_first_zone()]);
    let renderer = Arc::new(CountingRenderer::default());
    let codec: Arc<dyn Codec> = Arc::new(JpegCodec::default());
    let orchestrator = FeedOrchestrator::new(
        h.orchestrator.registry().clone(),
        h.orchestrator.zones().clone(),
        h.board.clone(),
        renderer.clone(),
        codec,
        &FeedConfig::default(),
    )
    .with_detector(detector.clone())
    .with_settings(FeedSettings {
        pace_interval: Duration::from_millis(1),
        read_backoff: Duration::from_millis(1),
        output_resolution: None,
    });
    let token = CancellationToken::new();

    let updates = orchestrator.updates("north", token.clone()).unwrap();
    futures::pin_mut!(updates);

    for _ in 0..3 {
        let state = tokio::time::timeout(Duration::from_secs(2), updates.next())
            .await
            .unwrap()
            .unwrap();
        assert!(state.is_occupied("Z1"));
        assert!(!state.is_occupied("Z2"));
        assert_eq!(state.occupied_count, 1);
    }

    token.cancel();
    assert!(updates.next().await.is_none());

    assert!(detector.calls.load(Ordering::SeqCst) >= 3);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.board.get("north").unwrap().occupied_count, 1);
}

#[tokio::test]
async fn test_updates_require_detector() {
    let h = harness(None).await;
    let result = h.orchestrator.updates("north", CancellationToken::new());

    assert!(matches!(result.err(), Some(ParkwatchError::System { .. })));
}

#[tokio::test]
async fn test_unknown_feed_source() {
    let h = harness(None).await;
    let result = h
        .orchestrator
        .feed("ghost", FeedMode::Raw, CancellationToken::new());

    assert!(matches!(
        result.err(),
        Some(ParkwatchError::Registry(RegistryError::UnknownSource(_)))
    ));
}

#[tokio::test]
async fn test_snapshot_falls_back_to_last_frame() {
    let h = harness(None).await;

    let first = h.orchestrator.snapshot("north").await.unwrap();
    assert_eq!(&first[..2], &[0xFF, 0xD8]);

    h.fetcher.online.store(false, Ordering::SeqCst);
    let fallback = h.orchestrator.snapshot("north").await.unwrap();
    assert_eq!(&fallback[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_snapshot_uses_output_resolution() {
    let h = harness(None).await;
    let orchestrator = h.orchestrator.clone().with_settings(FeedSettings {
        pace_interval: Duration::from_millis(1),
        read_backoff: Duration::from_millis(1),
        output_resolution: Some((64, 32)),
    });

    let jpeg = orchestrator.snapshot("north").await.unwrap();
    let image = JpegCodec::default().decode(&jpeg).unwrap();

    assert_eq!(image.dimensions(), (64, 32));
}

#[tokio::test]
async fn test_snapshot_without_any_frame() {
    let h = harness(None).await;
    h.fetcher.online.store(false, Ordering::SeqCst);

    assert!(matches!(
        h.orchestrator.snapshot("north").await,
        Err(ParkwatchError::Camera(CameraError::NoFrame { .. }))
    ));
}

#[tokio::test]
async fn test_status_reports_every_space() {
    let h = harness(Some(FixedDetector::new(vec![car_in_first_zone()]))).await;

    let idle = h.orchestrator.status("north");
    assert_eq!(idle.total_spaces, 2);
    assert_eq!(idle.free_spaces, 2);
    assert!(idle.last_update.is_none());

    let status = h
        .orchestrator
        .evaluate_once("north", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(status.occupied_spaces, 1);
    assert_eq!(status.free_spaces, 1);
    assert!(status.spaces[0].is_occupied);
    assert!(!status.spaces[1].is_occupied);
    assert!(status.last_update.is_some());
}

#[test]
fn test_multipart_part_layout() {
    let part = multipart::part(b"JPEG");
    assert_eq!(
        part.as_ref(),
        b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".as_slice()
    );
    assert!(multipart::CONTENT_TYPE.ends_with(multipart::BOUNDARY));
}

#[tokio::test]
async fn test_multipart_stream() {
    let frames = futures::stream::iter(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    let parts: Vec<Bytes> = multipart::into_parts(frames).collect().await;

    assert_eq!(parts.len(), 2);
    assert!(parts[1].starts_with(b"--frame\r\n"));
    assert!(parts[1].ends_with(b"b\r\n"));
}
