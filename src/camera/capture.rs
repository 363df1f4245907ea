use super::descriptor::AuthBinding;
use super::mode::AcquisitionMode;
use super::source::{FrameSlot, SourceCounters};
use super::structured::{StructuredDecoder, StructuredOpener};
use crate::codec::Codec;
use crate::error::{ParkwatchError, Result};
use crate::framer::{FrameFramer, StreamConnector};
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Which acquisition path the capture task is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    StructuredDecode,
    ManualFallback,
}

/// Sleep unless cancelled first. Returns `true` when cancelled.
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CaptureTimings {
    pub fallback_retry: Duration,
    pub idle_interval: Duration,
    pub max_scan_iterations: u32,
}

enum Step {
    Frame(RgbImage),
    Idle,
    Retry,
    Cancelled,
}

/// Background acquisition for one continuous source
pub(crate) struct CaptureLoop {
    source_id: String,
    mode: AcquisitionMode,
    auth: AuthBinding,
    opener: Arc<dyn StructuredOpener>,
    connector: Option<Arc<dyn StreamConnector>>,
    codec: Arc<dyn Codec>,
    slot: Arc<FrameSlot>,
    counters: Arc<SourceCounters>,
    token: CancellationToken,
    timings: CaptureTimings,
    state: CaptureState,
}

impl CaptureLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_id: String,
        mode: AcquisitionMode,
        auth: AuthBinding,
        opener: Arc<dyn StructuredOpener>,
        connector: Option<Arc<dyn StreamConnector>>,
        codec: Arc<dyn Codec>,
        slot: Arc<FrameSlot>,
        counters: Arc<SourceCounters>,
        token: CancellationToken,
        timings: CaptureTimings,
    ) -> Self {
        Self {
            source_id,
            mode,
            auth,
            opener,
            connector,
            codec,
            slot,
            counters,
            token,
            timings,
            state: CaptureState::StructuredDecode,
        }
    }

    /// Spawn on the current runtime
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            ParkwatchError::system(format!(
                "Continuous source '{}' needs a running tokio runtime",
                self.source_id
            ))
        })?;

        Ok(handle.spawn(self.run()))
    }

    async fn run(mut self) {
        info!("Capture task started for '{}' ({})", self.source_id, self.mode);
        self.counters.set_task_running(true);
        self.counters.set_state(self.state);

        let mut decoder: Option<Box<dyn StructuredDecoder>> = None;
        let mut framer: Option<FrameFramer> = None;

        while !self.token.is_cancelled() {
            let step = match self.state {
                CaptureState::StructuredDecode => self.structured_step(&mut decoder).await,
                CaptureState::ManualFallback => self.manual_step(&mut framer).await,
            };

            let cancelled = match step {
                Step::Frame(image) => {
                    let frame = self.slot.publish(image);
                    self.counters.record_frame();
                    trace!("Published frame {} for '{}'", frame.id, self.source_id);
                    false
                }
                Step::Idle => sleep_or_cancel(&self.token, self.timings.idle_interval).await,
                Step::Retry => sleep_or_cancel(&self.token, self.timings.fallback_retry).await,
                Step::Cancelled => true,
            };

            if cancelled {
                break;
            }
        }

        drop(decoder);
        drop(framer);
        self.counters.set_task_running(false);
        info!("Capture task stopped for '{}'", self.source_id);
    }

    async fn structured_step(&mut self, decoder: &mut Option<Box<dyn StructuredDecoder>>) -> Step {
        if decoder.is_none() {
            match self.open_decoder().await {
                Ok(opened) => {
                    debug!("Structured decoder opened for '{}'", self.source_id);
                    *decoder = Some(opened);
                }
                Err(e) => {
                    self.counters.record_failure();
                    return self.structured_failed(format!("open failed: {}", e));
                }
            }
        }

        let Some(active) = decoder.as_mut() else {
            return Step::Retry;
        };

        let result = tokio::select! {
            _ = self.token.cancelled() => return Step::Cancelled,
            result = active.read_frame() => result,
        };

        match result {
            Ok(image) => Step::Frame(image),
            Err(e) => {
                *decoder = None;
                self.counters.record_failure();
                self.structured_failed(format!("read failed: {}", e))
            }
        }
    }

    async fn open_decoder(&self) -> Result<Box<dyn StructuredDecoder>> {
        let opener = Arc::clone(&self.opener);
        let mode = self.mode.clone();
        let auth = self.auth.clone();

        tokio::task::spawn_blocking(move || opener.open(&mode, &auth))
            .await
            .map_err(|e| ParkwatchError::system(format!("Decoder open task failed: {}", e)))?
    }

    /// Local devices keep retrying the structured path; network sources
    /// switch to the manual framer for the rest of the task's life.
    fn structured_failed(&mut self, reason: String) -> Step {
        if self.mode.is_local() || self.connector.is_none() {
            warn!(
                "Structured capture for '{}' {}; retrying in {:?}",
                self.source_id, reason, self.timings.fallback_retry
            );
            return Step::Retry;
        }

        warn!(
            "Structured capture for '{}' {}; switching to manual fallback",
            self.source_id, reason
        );
        self.state = CaptureState::ManualFallback;
        self.counters.set_state(self.state);
        Step::Idle
    }

    async fn manual_step(&mut self, framer: &mut Option<FrameFramer>) -> Step {
        if framer.is_none() {
            let Some(connector) = self.connector.clone() else {
                error!("Manual fallback for '{}' has no raw connector", self.source_id);
                return Step::Retry;
            };
            debug!("Manual framer bound to {}", connector.describe());
            *framer = Some(FrameFramer::new(
                connector,
                Arc::clone(&self.codec),
                self.timings.max_scan_iterations,
            ));
        }

        let Some(active) = framer.as_mut() else {
            return Step::Retry;
        };

        let frame = tokio::select! {
            _ = self.token.cancelled() => return Step::Cancelled,
            frame = active.read_frame() => frame,
        };

        match frame {
            Some(image) => Step::Frame(image),
            None => {
                self.counters.record_failure();
                trace!("Manual framer for '{}' yielded nothing", self.source_id);
                Step::Retry
            }
        }
    }
}
