use super::*;
use crate::codec::JpegCodec;
use crate::error::{CameraError, ParkwatchError};
use image::Rgb;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

struct ScriptedStream {
    chunks: VecDeque<Bytes>,
}

#[async_trait]
impl ChunkStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.chunks.pop_front())
    }
}

/// Replays the same chunk script on every connection.
struct ScriptedConnector {
    chunks: Vec<Vec<u8>>,
    connects: AtomicUsize,
    fail: bool,
}

impl ScriptedConnector {
    fn new(chunks: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            connects: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            chunks: Vec::new(),
            connects: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn ChunkStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ParkwatchError::Camera(CameraError::Open {
                url: "scripted".to_string(),
                details: "refused".to_string(),
            }));
        }
        Ok(Box::new(ScriptedStream {
            chunks: self.chunks.iter().cloned().map(Bytes::from).collect(),
        }))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([90, 160, 20]));
    JpegCodec::default().encode(&image).unwrap().to_vec()
}

fn framer(connector: Arc<ScriptedConnector>, max_iterations: u32) -> FrameFramer {
    FrameFramer::new(connector, Arc::new(JpegCodec::default()), max_iterations)
}

#[test]
fn test_scanner_extracts_frame_and_keeps_trailing_bytes() {
    let body = [0x10, 0x20, 0x30, 0x40];
    let mut input = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
    input.extend_from_slice(&START_MARKER);
    input.extend_from_slice(&body);
    input.extend_from_slice(&END_MARKER);
    input.extend_from_slice(b"\r\n--fra");

    let mut scanner = MarkerScanner::new();
    scanner.extend(&input);

    let candidate = scanner.next_candidate().unwrap();
    let mut expected = START_MARKER.to_vec();
    expected.extend_from_slice(&body);
    expected.extend_from_slice(&END_MARKER);

    assert_eq!(candidate, expected);
    assert_eq!(scanner.buffered(), b"\r\n--fra");
}

#[test]
fn test_scanner_skips_end_marker_before_start() {
    let mut scanner = MarkerScanner::new();
    scanner.extend(&[0x00, 0xFF, 0xD9, 0x11, 0xFF, 0xD8, 0xAA, 0xFF, 0xD9, 0x42]);

    let candidate = scanner.next_candidate().unwrap();

    assert_eq!(candidate, vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9]);
    assert_eq!(scanner.buffered(), &[0x42]);
}

#[test]
fn test_scanner_waits_for_end_of_partial_frame() {
    let mut scanner = MarkerScanner::new();
    scanner.extend(&[0x01, 0x02, 0xFF, 0xD8, 0x55]);

    assert!(scanner.next_candidate().is_none());
    assert!(scanner.has_partial_frame());
    assert_eq!(scanner.buffered(), &[0xFF, 0xD8, 0x55]);

    scanner.extend(&[0x66, 0xFF, 0xD9]);
    assert_eq!(
        scanner.next_candidate().unwrap(),
        vec![0xFF, 0xD8, 0x55, 0x66, 0xFF, 0xD9]
    );
    assert!(scanner.buffered().is_empty());
}

#[test]
fn test_scanner_finds_end_marker_split_across_chunks() {
    let mut scanner = MarkerScanner::new();
    scanner.extend(&[0xFF, 0xD8, 0x10, 0x20]);
    assert!(scanner.next_candidate().is_none());

    scanner.extend(&[0x30; 128]);
    assert!(scanner.next_candidate().is_none());
    scanner.extend(&[0x40, 0xFF]);
    assert!(scanner.next_candidate().is_none());
    assert!(scanner.has_partial_frame());

    scanner.extend(&[0xD9, 0x01]);
    let candidate = scanner.next_candidate().unwrap();
    assert_eq!(candidate.len(), 4 + 128 + 2 + 1);
    assert_eq!(&candidate[candidate.len() - 2..], &END_MARKER);
    assert_eq!(scanner.buffered(), &[0x01]);
}

#[test]
fn test_scanner_trims_marker_free_input() {
    let mut scanner = MarkerScanner::new();
    scanner.extend(&[0x01; 64]);
    scanner.extend(&[0xFF]);

    assert!(scanner.next_candidate().is_none());
    assert_eq!(scanner.buffered(), &[0xFF]);

    // The kept byte completes a marker split across chunks
    scanner.extend(&[0xD8, 0x77, 0xFF, 0xD9]);
    assert_eq!(
        scanner.next_candidate().unwrap(),
        vec![0xFF, 0xD8, 0x77, 0xFF, 0xD9]
    );
}

#[tokio::test]
async fn test_framer_reads_frame_across_chunks() {
    let frame = jpeg(32, 24);
    let mut stream = b"garbage".to_vec();
    stream.extend_from_slice(&frame);
    stream.extend_from_slice(b"\r\n");
    let chunks: Vec<Vec<u8>> = stream.chunks(64).map(|c| c.to_vec()).collect();

    let connector = ScriptedConnector::new(chunks);
    let mut framer = framer(Arc::clone(&connector), 100);

    let image = framer.read_frame().await.unwrap();

    assert_eq!(image.dimensions(), (32, 24));
    assert!(framer.is_connected());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_framer_returns_buffered_frames_without_reading() {
    let mut chunk = jpeg(16, 16);
    chunk.extend_from_slice(&jpeg(8, 8));

    let connector = ScriptedConnector::new(vec![chunk]);
    let mut framer = framer(Arc::clone(&connector), 100);

    assert_eq!(framer.read_frame().await.unwrap().dimensions(), (16, 16));
    assert_eq!(framer.read_frame().await.unwrap().dimensions(), (8, 8));
    assert!(framer.is_connected());
}

#[tokio::test]
async fn test_framer_skips_corrupt_candidate() {
    let mut chunk = vec![0xFF, 0xD8, 0x00, 0x01, 0xFF, 0xD9];
    chunk.extend_from_slice(&jpeg(12, 10));

    let connector = ScriptedConnector::new(vec![chunk]);
    let mut framer = framer(connector, 100);

    assert_eq!(framer.read_frame().await.unwrap().dimensions(), (12, 10));
}

#[tokio::test]
async fn test_framer_reconnects_after_stream_end() {
    let connector = ScriptedConnector::new(vec![vec![0xFF, 0xD8, 0x01]]);
    let mut framer = framer(Arc::clone(&connector), 100);

    assert!(framer.read_frame().await.is_none());
    assert!(!framer.is_connected());
    assert!(framer.buffered().is_empty());

    assert!(framer.read_frame().await.is_none());
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_framer_bounded_scan_without_markers() {
    let chunks = vec![vec![0x01; 32]; 10];
    let connector = ScriptedConnector::new(chunks);
    let mut framer = framer(Arc::clone(&connector), 3);

    assert!(framer.read_frame().await.is_none());
    assert!(!framer.is_connected());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_framer_keeps_partial_frame_when_scan_is_exhausted() {
    let frame = jpeg(24, 24);
    let chunks: Vec<Vec<u8>> = frame.chunks(16).map(|c| c.to_vec()).collect();
    assert!(chunks.len() > 2);

    let connector = ScriptedConnector::new(chunks);
    let mut framer = framer(Arc::clone(&connector), 2);

    assert!(framer.read_frame().await.is_none());
    assert!(framer.is_connected());

    let mut image = None;
    for _ in 0..100 {
        image = framer.read_frame().await;
        if image.is_some() {
            break;
        }
    }

    assert_eq!(image.unwrap().dimensions(), (24, 24));
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_framer_drops_unterminated_frame_past_size_limit() {
    let mut chunks = vec![vec![0xFF, 0xD8]];
    chunks.extend(std::iter::repeat(vec![0x11; 64]).take(50));

    let connector = ScriptedConnector::new(chunks);
    let mut framer = framer(Arc::clone(&connector), 100).with_max_frame_bytes(256);

    assert!(framer.read_frame().await.is_none());
    assert!(!framer.is_connected());
    assert!(framer.buffered().is_empty());

    assert!(framer.read_frame().await.is_none());
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_framer_connect_failure_is_not_fatal() {
    let connector = ScriptedConnector::failing();
    let mut framer = framer(Arc::clone(&connector), 10);

    assert!(framer.read_frame().await.is_none());
    assert!(framer.read_frame().await.is_none());
    assert_eq!(connector.connects(), 2);
}
