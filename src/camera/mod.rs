mod builder;
mod capture;
mod descriptor;
mod http;
mod mode;
mod snapshot;
mod source;
mod structured;

pub use builder::{CameraSourceBuilder, DefaultSourceFactory, SourceFactory};
pub use capture::CaptureState;
pub use descriptor::{AuthBinding, AuthMode, SourceDescriptor};
pub use http::{CameraHttpClient, HttpStreamConnector};
pub use mode::{credentials_uri, AcquisitionMode};
pub use snapshot::{HttpSnapshotFetcher, SnapshotFetcher};
pub use source::{CameraSource, FrameRead, SourceStats};
pub use structured::{
    default_structured_opener, StructuredDecoder, StructuredOpener, UnavailableOpener,
};

pub(crate) use capture::sleep_or_cancel;
