pub mod app;
pub mod camera;
pub mod codec;
pub mod config;
pub mod detector;
pub mod error;
pub mod feed;
pub mod frame;
pub mod framer;
pub mod occupancy;
pub mod registry;
pub mod render;
pub mod zones;

pub use app::{ComponentState, ParkwatchApp, ShutdownReason};
pub use camera::{
    AcquisitionMode, AuthMode, CameraSource, CameraSourceBuilder, CaptureState,
    DefaultSourceFactory, FrameRead, SourceDescriptor, SourceFactory, SourceStats,
};
pub use codec::{Codec, JpegCodec};
pub use config::ParkwatchConfig;
pub use detector::{BoundingBox, Detection, DetectionFilter, Detector, RemoteDetector};
pub use error::{ParkwatchError, Result};
pub use feed::{FeedFrame, FeedMode, FeedOrchestrator};
pub use frame::FrameData;
pub use framer::FrameFramer;
pub use occupancy::{OccupancyBoard, OccupancyState, ParkingStatus, SpaceStatus};
pub use registry::SourceRegistry;
pub use render::{FrameRenderer, PassthroughRenderer};
pub use zones::{Evaluation, Point, Zone, ZoneBook, ZoneEvaluator};
