use super::descriptor::AuthBinding;
use super::mode::AcquisitionMode;
use crate::error::Result;
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;

/// An open, format-aware decoder (container/stream demuxing handled for us).
#[async_trait]
pub trait StructuredDecoder: Send {
    /// Next decoded frame. Any error counts as a failed read.
    async fn read_frame(&mut self) -> Result<RgbImage>;
}

/// Opens structured decoders. Dropping the returned decoder releases it.
pub trait StructuredOpener: Send + Sync {
    fn open(&self, mode: &AcquisitionMode, auth: &AuthBinding) -> Result<Box<dyn StructuredDecoder>>;
}

/// The structured opener available on this build
pub fn default_structured_opener(pull_timeout: Duration) -> Arc<dyn StructuredOpener> {
    #[cfg(all(target_os = "linux", feature = "camera"))]
    {
        Arc::new(gst::GstOpener::new(pull_timeout))
    }

    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    {
        let _ = pull_timeout;
        Arc::new(UnavailableOpener)
    }
}

/// Opener for builds without GStreamer: every open fails, which sends network
/// sources straight to the manual fallback.
pub struct UnavailableOpener;

impl StructuredOpener for UnavailableOpener {
    fn open(&self, mode: &AcquisitionMode, _auth: &AuthBinding) -> Result<Box<dyn StructuredDecoder>> {
        Err(crate::error::CameraError::DecoderUnavailable {
            details: format!("no structured decoder compiled in for {}", mode),
        }
        .into())
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst {
    use super::*;
    use crate::camera::mode::credentials_uri;
    use crate::error::CameraError;
    use gstreamer::prelude::*;
    use gstreamer::Pipeline;
    use gstreamer_app::AppSink;
    use gstreamer_video::VideoInfo;
    use tracing::{debug, info};

    const SINK: &str = "videoconvert ! video/x-raw,format=RGB ! \
                        appsink name=sink sync=false max-buffers=1 drop=true";

    /// GStreamer opener: `v4l2src` for local devices, `uridecodebin` for URLs
    pub struct GstOpener {
        pull_timeout: Duration,
    }

    impl GstOpener {
        pub fn new(pull_timeout: Duration) -> Self {
            Self { pull_timeout }
        }

        fn pipeline_description(mode: &AcquisitionMode, auth: &AuthBinding) -> Result<String> {
            match mode {
                AcquisitionMode::LocalDevice { index } => Ok(format!(
                    "v4l2src device=/dev/video{} ! {}",
                    index, SINK
                )),
                AcquisitionMode::Continuous { url } => Ok(format!(
                    "uridecodebin uri=\"{}\" ! {}",
                    credentials_uri(url, auth),
                    SINK
                )),
                AcquisitionMode::OnDemand { url } => Err(CameraError::Open {
                    url: url.clone(),
                    details: "snapshot endpoints are not streamed".to_string(),
                }
                .into()),
            }
        }
    }

    impl StructuredOpener for GstOpener {
        fn open(&self, mode: &AcquisitionMode, auth: &AuthBinding) -> Result<Box<dyn StructuredDecoder>> {
            let target = mode.to_string();
            let open_error = |details: String| CameraError::Open {
                url: target.clone(),
                details,
            };

            gstreamer::init().map_err(|e| open_error(format!("Failed to initialize GStreamer: {}", e)))?;

            let description = Self::pipeline_description(mode, auth)?;
            debug!("Creating GStreamer pipeline for {}", target);

            let pipeline = gstreamer::parse::launch(&description)
                .map_err(|e| open_error(format!("Failed to create pipeline: {}", e)))?
                .downcast::<Pipeline>()
                .map_err(|_| open_error("Failed to downcast to Pipeline".to_string()))?;

            let sink = pipeline
                .by_name("sink")
                .ok_or_else(|| open_error("Failed to get appsink".to_string()))?
                .downcast::<AppSink>()
                .map_err(|_| open_error("Failed to downcast to AppSink".to_string()))?;

            pipeline
                .set_state(gstreamer::State::Playing)
                .map_err(|e| open_error(format!("Failed to start pipeline: {}", e)))?;

            info!("GStreamer pipeline started for {}", target);

            Ok(Box::new(GstDecoder {
                pipeline,
                sink,
                pull_timeout: self.pull_timeout,
            }))
        }
    }

    struct GstDecoder {
        pipeline: Pipeline,
        sink: AppSink,
        pull_timeout: Duration,
    }

    #[async_trait]
    impl StructuredDecoder for GstDecoder {
        async fn read_frame(&mut self) -> Result<RgbImage> {
            let sink = self.sink.clone();
            let timeout = gstreamer::ClockTime::from_mseconds(self.pull_timeout.as_millis() as u64);

            let sample = tokio::task::spawn_blocking(move || sink.try_pull_sample(timeout))
                .await
                .map_err(|e| CameraError::CaptureStream {
                    details: format!("Sample pull task failed: {}", e),
                })?
                .ok_or_else(|| CameraError::CaptureStream {
                    details: if self.sink.is_eos() {
                        "end of stream".to_string()
                    } else {
                        format!("no sample within {:?}", self.pull_timeout)
                    },
                })?;

            sample_to_image(&sample)
        }
    }

    impl Drop for GstDecoder {
        fn drop(&mut self) {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }

    fn sample_to_image(sample: &gstreamer::Sample) -> Result<RgbImage> {
        let stream_error = |details: String| CameraError::CaptureStream { details };

        let buffer = sample
            .buffer()
            .ok_or_else(|| stream_error("No buffer in sample".to_string()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| stream_error("No caps in sample".to_string()))?;
        let video_info = VideoInfo::from_caps(caps)
            .map_err(|e| stream_error(format!("Failed to get video info: {}", e)))?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let map = buffer
            .map_readable()
            .map_err(|e| stream_error(format!("Failed to map buffer: {}", e)))?;
        let data = map.as_slice();

        // Rows may be padded; copy them out tightly packed.
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            if end > data.len() {
                return Err(stream_error(format!(
                    "Buffer too short for {}x{} RGB frame",
                    width, height
                ))
                .into());
            }
            pixels.extend_from_slice(&data[start..end]);
        }

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| stream_error("Frame dimensions do not match pixel data".to_string()).into())
    }
}
